use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Permission: u32 {
        const NONE               = 0;
        const MODERATE_POSTS     = 1 << 0;
        const MODERATE_COMMENTS  = 1 << 1;
        const MANAGE_CATEGORIES  = 1 << 2;
        const MANAGE_LOCATIONS   = 1 << 3;
        const ADMIN_PANEL        = 1 << 4;
    }
}

pub const ROLE_USER: i32 = 0;
pub const ROLE_MODERATOR: i32 = 1;
pub const ROLE_ADMIN: i32 = 2;
pub const ROLE_OWNER: i32 = 999;

/// User permissions by role
/// 0 -> User
/// 1 -> Moderator (posts and comments, through the admin panel)
/// 2 -> Admin
/// 999 -> Owner
pub fn role_permissions(role_id: i32) -> Permission {
    match role_id {
        ROLE_USER => Permission::NONE,
        ROLE_MODERATOR => {
            Permission::ADMIN_PANEL | Permission::MODERATE_POSTS | Permission::MODERATE_COMMENTS
        }
        ROLE_ADMIN => {
            Permission::ADMIN_PANEL
                | Permission::MODERATE_POSTS
                | Permission::MODERATE_COMMENTS
                | Permission::MANAGE_CATEGORIES
                | Permission::MANAGE_LOCATIONS
        }
        ROLE_OWNER => Permission::all(),
        _ => Permission::NONE,
    }
}

pub fn permissions_to_list(p: Permission) -> Vec<&'static str> {
    p.iter_names().map(|(name, _)| name).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_users_cannot_enter_admin_panel() {
        assert!(!role_permissions(ROLE_USER).contains(Permission::ADMIN_PANEL));
        assert!(!role_permissions(42).contains(Permission::ADMIN_PANEL));
    }

    #[test]
    fn moderators_do_not_manage_taxonomy() {
        let p = role_permissions(ROLE_MODERATOR);
        assert!(p.contains(Permission::MODERATE_POSTS));
        assert!(!p.contains(Permission::MANAGE_CATEGORIES));
        assert!(!p.contains(Permission::MANAGE_LOCATIONS));
    }

    #[test]
    fn lists_names_in_declaration_order() {
        assert_eq!(
            permissions_to_list(role_permissions(ROLE_MODERATOR)),
            vec!["MODERATE_POSTS", "MODERATE_COMMENTS", "ADMIN_PANEL"]
        );
        assert_eq!(permissions_to_list(role_permissions(ROLE_OWNER)).len(), 5);
    }
}
