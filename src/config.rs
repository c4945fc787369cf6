//! Runtime configuration passed explicitly into the controllers
//!
//! Nothing in the engine reads the process environment. The binary collects
//! these values (flags or env via clap) and hands them to [`crate::controller::Context`].

use std::fmt;
use std::time::Duration;

/// Default timeout for a single VPC or IAM HTTP request
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default delay before the scheduler re-delivers a failed pass
pub const DEFAULT_ERROR_REQUEUE: Duration = Duration::from_secs(30);

/// Credentials and endpoints used to open a VPC API session
///
/// Consumed once per reconciliation pass at scope construction.
#[derive(Clone, PartialEq, Eq)]
pub struct VpcCredentials {
    /// Identity-and-access endpoint (e.g. `https://iam.cloud.ibm.com`)
    pub iam_endpoint: String,
    /// API key exchanged for a bearer token
    pub api_key: String,
    /// VPC service endpoint (e.g. `https://us-south.iaas.cloud.ibm.com`)
    pub service_endpoint: String,
}

impl VpcCredentials {
    /// Create credentials from the three opaque strings
    pub fn new(
        iam_endpoint: impl Into<String>,
        api_key: impl Into<String>,
        service_endpoint: impl Into<String>,
    ) -> Self {
        Self {
            iam_endpoint: iam_endpoint.into(),
            api_key: api_key.into(),
            service_endpoint: service_endpoint.into(),
        }
    }
}

impl fmt::Debug for VpcCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VpcCredentials")
            .field("iam_endpoint", &self.iam_endpoint)
            .field("api_key", &"<redacted>")
            .field("service_endpoint", &self.service_endpoint)
            .finish()
    }
}

/// Settings for the controller processes
#[derive(Clone, Debug)]
pub struct ControllerConfig {
    /// Per-request timeout for the VPC client
    pub request_timeout: Duration,
    /// Delay the scheduler waits before re-running a failed pass
    pub error_requeue: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            error_requeue: DEFAULT_ERROR_REQUEUE,
        }
    }
}
