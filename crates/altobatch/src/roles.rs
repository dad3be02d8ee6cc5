//! Maps externally supplied role names onto the internal capability set.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Editor,
    Curator,
}

/// Configurable names the external identity service uses for the two roles.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RoleMapping {
    pub editor: String,
    pub curator: String,
}

impl Default for RoleMapping {
    fn default() -> Self {
        Self {
            editor: "AltoEditor".to_string(),
            curator: "AltoCurator".to_string(),
        }
    }
}

/// Capability set of one external user.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPermissions {
    pub username: String,
    pub roles: Vec<Role>,
    pub editor: bool,
    pub curator: bool,
}

/// Unknown role names are ignored; duplicates collapse to one role.
pub fn resolve_permissions(
    mapping: &RoleMapping,
    username: &str,
    role_names: &[String],
) -> UserPermissions {
    let mut roles = Vec::new();
    for name in role_names {
        let role = if *name == mapping.editor {
            Some(Role::Editor)
        } else if *name == mapping.curator {
            Some(Role::Curator)
        } else {
            None
        };

        if let Some(role) = role {
            if !roles.contains(&role) {
                roles.push(role);
            }
        }
    }

    UserPermissions {
        username: username.to_string(),
        editor: roles.contains(&Role::Editor),
        curator: roles.contains(&Role::Curator),
        roles,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_resolves_mapped_roles() {
        let mapping = RoleMapping::default();
        let user = resolve_permissions(
            &mapping,
            "novakova",
            &names(&["AltoEditor", "AltoCurator"]),
        );

        assert_eq!(user.username, "novakova");
        assert!(user.editor);
        assert!(user.curator);
        assert_eq!(user.roles, vec![Role::Editor, Role::Curator]);
    }

    #[test]
    fn test_unknown_roles_ignored() {
        let mapping = RoleMapping::default();
        let user = resolve_permissions(&mapping, "svoboda", &names(&["admin", "AltoEditor"]));

        assert!(user.editor);
        assert!(!user.curator);
        assert_eq!(user.roles.len(), 1);
    }

    #[test]
    fn test_duplicates_collapse() {
        let mapping = RoleMapping::default();
        let user =
            resolve_permissions(&mapping, "dvorak", &names(&["AltoCurator", "AltoCurator"]));

        assert_eq!(user.roles, vec![Role::Curator]);
    }

    #[test]
    fn test_custom_mapping() {
        let mapping = RoleMapping {
            editor: "librarians".to_string(),
            curator: "chief-librarians".to_string(),
        };
        let user = resolve_permissions(&mapping, "horak", &names(&["chief-librarians"]));

        assert!(!user.editor);
        assert!(user.curator);
    }

    #[test]
    fn test_no_roles() {
        let mapping = RoleMapping::default();
        let user = resolve_permissions(&mapping, "anonymous", &[]);

        assert!(!user.editor);
        assert!(!user.curator);
        assert!(user.roles.is_empty());
    }
}
