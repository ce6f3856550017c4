use uuid::Uuid;

/// Prefix of every generated identifier; keeps the value a valid NCName
pub const ID_PREFIX: &str = "id-";

/// Generate a fresh element identifier of the form `id-<uuid4>`
pub fn unique_id() -> String {
    format!("{ID_PREFIX}{}", Uuid::new_v4())
}
