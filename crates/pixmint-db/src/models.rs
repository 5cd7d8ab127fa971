/// Database row types. These map directly to SQLite rows and stay independent
/// of the wire types in pixmint-types.

pub struct UserRow {
    pub id: String,
    pub tokens: i64,
    pub created_at: String,
}

pub struct ImageRow {
    pub id: String,
    pub user_id: String,
    pub prompt: String,
    pub image_url: String,
    pub created_at: String,
}
