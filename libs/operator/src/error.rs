use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// All errors possible to occur during reconciliation.
///
/// Each variant's [`Error::reason`] doubles as the `Reason` written onto a
/// resource's status conditions, so the taxonomy here must stay aligned
/// with the condition reasons reconcilers emit.
#[derive(Debug, Error)]
pub enum Error {
    /// Any error originating from the `kube` crate: transient API errors,
    /// not-found, and optimistic-concurrency conflicts all surface here.
    #[error("Kubernetes reported error: {0}")]
    KubeError(#[from] kube::Error),

    /// Membership lookup against the relational store failed or the store
    /// is unreachable.
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("org {0} not found")]
    OrgNotFound(String),

    #[error("project {0} not found")]
    ProjectNotFound(String),

    #[error("cluster {0} not found")]
    ClusterNotFound(String),

    #[error("secret {namespace}/{name} not found")]
    SecretNotFound { namespace: String, name: String },

    #[error("secret {namespace}/{name} is missing the `kubeconfig` key")]
    MalformedCredential { namespace: String, name: String },

    #[error("credential for secret {namespace}/{name} could not be parsed: {source}")]
    CredentialParseError {
        namespace: String,
        name: String,
        source: serde_yaml::Error,
    },

    #[error("cluster quota exceeded for org {org}: {count} clusters exceeds quota {quota}")]
    ClusterQuotaExceeded { org: String, quota: i32, count: i32 },

    #[error(
        "application quota exceeded for org {org}: {count} applications exceeds quota {quota}"
    )]
    ApplicationQuotaExceeded { org: String, quota: i32, count: i32 },

    #[error("health probe failed: {0}")]
    HealthCheckFailed(String),

    #[error("health probe exceeded its deadline")]
    HealthCheckTimeout,

    #[error("failed to delete a ProjectClusterBinding owned by this project: {0}")]
    ClusterBindingDeletionError(#[source] kube::Error),

    #[error("failed to ensure namespace: {0}")]
    NamespaceCreationError(#[source] kube::Error),

    #[error("failed to ensure resource quota: {0}")]
    QuotaCreationError(#[source] kube::Error),

    #[error("failed to ensure default-deny network policy: {0}")]
    NetworkPolicyCreationError(#[source] kube::Error),

    #[error("failed to look up project members: {0}")]
    ProjectMemberLookupError(#[source] sqlx::Error),

    #[error("failed to ensure role binding: {0}")]
    RoleBindingCreationError(#[source] kube::Error),

    #[error("invalid resource: {0}")]
    UserInputError(String),

    #[error("invalid trace id")]
    InvalidTraceId,

    #[error("status update retries exhausted: {0}")]
    StatusConflictRetriesExhausted(kube::Error),
}

impl Error {
    /// Short, stable label used both as a Prometheus metric label and as
    /// the `Reason` on a status condition.
    pub fn reason(&self) -> &'static str {
        match self {
            Error::KubeError(_) => "ApiError",
            Error::Db(_) => "DatabaseUnavailable",
            Error::OrgNotFound(_) => "OrgNotFound",
            Error::ProjectNotFound(_) => "ProjectLookupError",
            Error::ClusterNotFound(_) => "ClusterLookupError",
            Error::SecretNotFound { .. } => "KubeconfigSecretMissing",
            Error::MalformedCredential { .. } => "MalformedCredential",
            Error::CredentialParseError { .. } => "CredentialParseError",
            Error::ClusterQuotaExceeded { .. } => "ClusterQuotaExceeded",
            Error::ApplicationQuotaExceeded { .. } => "ApplicationQuotaExceeded",
            Error::HealthCheckFailed(_) => "HealthCheckFailed",
            Error::HealthCheckTimeout => "HealthCheckFailed",
            Error::UserInputError(_) => "InvalidSpec",
            Error::InvalidTraceId => "InvalidTraceId",
            Error::StatusConflictRetriesExhausted(_) => "StatusConflict",
            Error::ClusterBindingDeletionError(_) => "ClusterBindingDeletionError",
            Error::NamespaceCreationError(_) => "NamespaceCreationError",
            Error::QuotaCreationError(_) => "QuotaCreationError",
            Error::NetworkPolicyCreationError(_) => "NetworkPolicyCreationError",
            Error::ProjectMemberLookupError(_) => "ProjectMemberLookupError",
            Error::RoleBindingCreationError(_) => "RoleBindingCreationError",
        }
    }

    pub fn metric_label(&self) -> String {
        self.reason().to_owned()
    }
}
