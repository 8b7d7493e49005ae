// Defaults, header names and API path templates for the VSC API

use std::time::Duration;

/// Hostname used when none is configured
pub const DEFAULT_HOSTNAME: &str = "api.vsc.com";

/// TCP port used when neither the caller nor an SRV record supplies one
pub const DEFAULT_PORT: u16 = 8914;

/// Per-request timeout used when none is configured
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Service name prefix for SRV-based endpoint discovery
pub const SRV_PREFIX: &str = "_vsc-api-server._tcp.";

pub const USER_AGENT: &str = concat!("VscApiRustClient/", env!("CARGO_PKG_VERSION"));

pub mod header {
    /// Response header carrying the server-assigned identity of the caller
    pub const USER_ID: &str = "X-VSC-User-ID";

    // Plain-header credential transport
    pub const USERNAME: &str = "X-VSC-Username";
    pub const PASSWORD: &str = "X-VSC-Password";
}

pub mod api_path {
    pub const WHOAMI: &str = "whoami";

    // AAA
    pub const AAA_USER: &str = "aaa/user";
    pub const AAA_ROLE: &str = "aaa/role";
    pub const AAA_PASSWD: &str = "aaa/passwd";

    // Jobs
    pub const JOB: &str = "job";
    pub const LIST_JOBS: &str = "list_jobs";

    // Packages
    pub const PACKAGE: &str = "package";
    pub const LIST_PACKAGES: &str = "list_packages";

    // Images
    pub const IMAGE: &str = "image";
    pub const LIST_IMAGES: &str = "list_images";
    pub const IMAGE_RECEIVER: &str = "image_receiver";

    // Job profiles
    pub const JOB_PROFILE: &str = "job_profile";
    pub const LIST_JOB_PROFILES: &str = "list_job_profiles";
    pub const LIST_PUBLIC_JOB_PROFILES: &str = "list_public_job_profiles";

    pub fn user(user_id: &str) -> String {
        format!("{AAA_USER}/{user_id}")
    }

    pub fn user_roles(user_id: &str) -> String {
        format!("{AAA_USER}/{user_id}/roles")
    }

    pub fn user_role(user_id: &str, role_id: &str) -> String {
        format!("{AAA_USER}/{user_id}/roles/{role_id}")
    }

    pub fn role(role_id: &str) -> String {
        format!("{AAA_ROLE}/{role_id}")
    }

    pub fn role_minors(major_id: &str) -> String {
        format!("{AAA_ROLE}/{major_id}/minors")
    }

    pub fn role_minor(major_id: &str, minor_id: &str) -> String {
        format!("{AAA_ROLE}/{major_id}/minors/{minor_id}")
    }

    pub fn role_majors(minor_id: &str) -> String {
        format!("{AAA_ROLE}/{minor_id}/majors")
    }

    pub fn role_users(role_id: &str) -> String {
        format!("{AAA_ROLE}/{role_id}/users")
    }

    pub fn job(job_id: &str) -> String {
        format!("{JOB}/{job_id}")
    }

    pub fn job_forwards(job_id: &str) -> String {
        format!("{JOB}/{job_id}/fwd")
    }

    pub fn package(package_id: &str) -> String {
        format!("{PACKAGE}/{package_id}")
    }

    pub fn image(image_id: &str) -> String {
        format!("{IMAGE}/{image_id}")
    }

    pub fn image_url(image_id: &str) -> String {
        format!("{IMAGE}/{image_id}/genurl")
    }

    pub fn job_profile(job_profile_id: &str) -> String {
        format!("{JOB_PROFILE}/{job_profile_id}")
    }
}
