//! Table definitions.
//!
//! Tables are listed parents first. `drop_all` walks the list backwards so a
//! child never outlives its parent's table.

pub(crate) const TABLES: [&str; 6] = [
    "roles",
    "collections",
    "permissions",
    "documents",
    "entities",
    "records",
];

pub(crate) const CREATE_STATEMENTS: [&str; 7] = [
    r#"
    CREATE TABLE IF NOT EXISTS roles (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        foreign_id TEXT NOT NULL UNIQUE,
        type TEXT NOT NULL CHECK (type IN ('user', 'group', 'system')),
        name TEXT NOT NULL,
        email TEXT,
        is_admin INTEGER NOT NULL DEFAULT 0,
        api_key TEXT UNIQUE,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS collections (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        foreign_id TEXT NOT NULL UNIQUE,
        label TEXT NOT NULL,
        summary TEXT,
        category TEXT,
        creator_id INTEGER REFERENCES roles(id) ON DELETE SET NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS permissions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        collection_id INTEGER NOT NULL REFERENCES collections(id) ON DELETE CASCADE,
        role_id INTEGER NOT NULL REFERENCES roles(id) ON DELETE CASCADE,
        read INTEGER NOT NULL DEFAULT 0,
        write INTEGER NOT NULL DEFAULT 0,
        UNIQUE (collection_id, role_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS documents (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        collection_id INTEGER NOT NULL REFERENCES collections(id) ON DELETE CASCADE,
        title TEXT,
        file_name TEXT,
        content_type TEXT,
        content_hash TEXT,
        source_url TEXT,
        status TEXT NOT NULL DEFAULT 'pending'
            CHECK (status IN ('pending', 'processing', 'done', 'failed')),
        error_message TEXT,
        uploader_id INTEGER REFERENCES roles(id) ON DELETE SET NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS entities (
        id TEXT PRIMARY KEY,
        collection_id INTEGER NOT NULL REFERENCES collections(id) ON DELETE CASCADE,
        schema TEXT NOT NULL,
        properties TEXT NOT NULL DEFAULT '{}',
        document_id INTEGER REFERENCES documents(id) ON DELETE CASCADE,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS records (
        id TEXT PRIMARY KEY,
        document_id INTEGER NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
        collection_id INTEGER NOT NULL REFERENCES collections(id) ON DELETE CASCADE,
        idx INTEGER NOT NULL,
        text TEXT NOT NULL,
        UNIQUE (document_id, idx)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents (collection_id, status)",
];
