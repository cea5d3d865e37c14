pub const ADMINISTRATOR: &str = "administrator";
pub const MANAGE_EMOJIS: &str = "manage_emojis";

/// `administrator` implies every other permission.
pub fn has_permission(perms: &[String], perm: &str) -> bool {
    perms.iter().any(|p| p == ADMINISTRATOR || p == perm)
}
