use sqlx::PgPool;

/// A row of `project_members` joined to `users`, already filtered to
/// members whose role is known to this controller. Spec.md 4.8 step 7:
/// unknown roles are skipped with a log event rather than surfaced as
/// an error, since an org admin may define roles this controller does
/// not yet project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectMember {
    pub user_id: String,
    pub email: String,
    pub role: String,
}

#[derive(sqlx::FromRow)]
struct ProjectMemberRow {
    email: String,
    user_id: String,
    role: String,
}

/// Read-through access to the relational membership store (spec.md 9:
/// "the core does not write to the relational store"). A thin wrapper
/// around a connection pool so reconcilers don't reach for `sqlx`
/// directly.
#[derive(Clone)]
pub struct MembershipRepository {
    pool: PgPool,
}

impl MembershipRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn members_of_project(&self, project_id: &str) -> sqlx::Result<Vec<ProjectMember>> {
        let rows = sqlx::query_as::<_, ProjectMemberRow>(
            r#"
            SELECT u.email AS email, pm.user_id AS user_id, pm.role AS role
            FROM project_members pm
            JOIN users u ON u.id = pm.user_id
            WHERE pm.project_id = $1
            "#,
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| ProjectMember {
                user_id: r.user_id,
                email: r.email,
                role: r.role,
            })
            .collect())
    }
}

/// Maps a `project_members.role` value to the built-in cluster-scoped
/// RBAC role it projects to (spec.md 4.8 step 7). Returns `None` for an
/// unrecognized role so the caller can log-and-skip.
pub fn map_role_to_rbac(role: &str) -> Option<&'static str> {
    match role {
        "admin" => Some("admin"),
        "maintainer" => Some("edit"),
        "viewer" => Some("view"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_known_roles() {
        assert_eq!(map_role_to_rbac("admin"), Some("admin"));
        assert_eq!(map_role_to_rbac("maintainer"), Some("edit"));
        assert_eq!(map_role_to_rbac("viewer"), Some("view"));
    }

    #[test]
    fn unknown_role_is_skipped_not_errored() {
        assert_eq!(map_role_to_rbac("superadmin"), None);
    }
}
