// VscApiClient - facade for all VSC API operations

use std::{sync::Arc, time::Duration};

use serde_json::Value;
use uuid::Uuid;

use crate::{
    config::{CredentialMode, VscClientConfig},
    constants::{DEFAULT_HOSTNAME, api_path},
    error::{Result, VscError},
    http::{Reply, RequestSpec, VscHttpClient},
    model::{ForwardRule, JobStopOptions, ListFormat, WhoAmI},
    resolver::{EndpointCandidate, ServiceLocator, SystemServiceLocator, resolve},
};

const USER_FORMATS: &[ListFormat] = &[ListFormat::IdsOnly, ListFormat::Full];
const JOB_DATA_FORMATS: &[ListFormat] = &[ListFormat::Basic, ListFormat::Full];
const JOB_LIST_FORMATS: &[ListFormat] = &[ListFormat::Basic, ListFormat::Full, ListFormat::IdsOnly];
const ARTIFACT_FORMATS: &[ListFormat] = &[ListFormat::Full, ListFormat::IdsOnly];

fn check_format(format: ListFormat, allowed: &[ListFormat]) -> Result<()> {
    if allowed.contains(&format) {
        Ok(())
    } else {
        Err(VscError::bad_argument(format!("Bad format value '{format}'")))
    }
}

fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Client for the VSC API
pub struct VscApiClient {
    http: VscHttpClient,
    locator: Arc<dyn ServiceLocator>,
}

impl VscApiClient {
    /// Create a new client, resolving the configured endpoint through the
    /// system DNS
    pub fn new(config: VscClientConfig) -> Result<Self> {
        Self::with_locator(config, Arc::new(SystemServiceLocator))
    }

    /// Create a new client with a custom service discovery backend
    pub fn with_locator(config: VscClientConfig, locator: Arc<dyn ServiceLocator>) -> Result<Self> {
        let candidates = resolve(&config.hostname, config.port, locator.as_ref())?;
        let http = VscHttpClient::new(&config, candidates)?;
        Ok(Self { http, locator })
    }

    /// Create a new client configured from `VSC_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(VscClientConfig::from_env()?)
    }

    // ============================================================================
    // Client configuration
    // ============================================================================

    /// Point the client at another endpoint. On failure the previous
    /// endpoints stay in effect.
    pub fn set_endpoint(&mut self, hostname: Option<&str>, port: Option<u16>) -> Result<()> {
        let hostname = hostname.unwrap_or(DEFAULT_HOSTNAME);
        let candidates = resolve(hostname, port, self.locator.as_ref())?;
        self.http.set_candidates(candidates);
        Ok(())
    }

    /// Set new credentials. A different username invalidates the cached
    /// identity.
    pub fn set_auth(&mut self, username: Option<&str>, password: Option<&str>) {
        self.http
            .set_auth(username.map(str::to_string), password.map(str::to_string));
    }

    /// Drop the credentials and the cached identity
    pub fn drop_auth(&mut self) {
        self.http.drop_auth();
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.http.set_timeout(timeout);
    }

    pub fn set_use_tls(&mut self, use_tls: bool) {
        self.http.set_use_tls(use_tls);
    }

    pub fn set_credential_mode(&mut self, mode: CredentialMode) {
        self.http.set_credential_mode(mode);
    }

    pub fn endpoints(&self) -> &[EndpointCandidate] {
        self.http.candidates()
    }

    /// Caller identity reported by the server, once known
    pub fn user_id(&self) -> Option<String> {
        self.http.user_id()
    }

    /// Send an arbitrary request through the client
    pub fn request(&self, spec: &RequestSpec) -> Result<Reply> {
        self.http.execute(spec)
    }

    fn call(&self, spec: RequestSpec) -> Result<Value> {
        Ok(self.http.execute(&spec)?.into_json())
    }

    fn send(&self, spec: RequestSpec) -> Result<()> {
        self.http.execute(&spec)?;
        Ok(())
    }

    // ============================================================================
    // Identity
    // ============================================================================

    /// UUID of the user identified by the configured credentials
    pub fn whoami(&self) -> Result<String> {
        let reply: WhoAmI = self.http.execute(&RequestSpec::get(api_path::WHOAMI))?.decode()?;
        Ok(reply.id)
    }

    // ============================================================================
    // AAA: users
    // ============================================================================

    /// Create a user. Returns its UUID, generated when not given.
    pub fn aaa_add_user(&self, data: &Value, user_id: Option<&str>) -> Result<String> {
        let user_id = user_id.map(str::to_string).unwrap_or_else(new_id);
        self.send(RequestSpec::post(api_path::user(&user_id)).body(data.clone()))?;
        Ok(user_id)
    }

    pub fn aaa_update_user(&self, user_id: &str, data: &Value) -> Result<()> {
        self.send(RequestSpec::put(api_path::user(user_id)).body(data.clone()))
    }

    /// Change the password of the current user. The client keeps the old
    /// credentials until `set_auth` is called.
    pub fn aaa_passwd(&self, password: &str) -> Result<()> {
        self.send(RequestSpec::post(api_path::AAA_PASSWD).json(password)?)
    }

    pub fn aaa_list_users(&self, format: ListFormat) -> Result<Value> {
        check_format(format, USER_FORMATS)?;
        self.call(RequestSpec::get(api_path::AAA_USER).param("format", format))
    }

    pub fn aaa_get_user_data(&self, user_id: &str) -> Result<Value> {
        self.call(RequestSpec::get(api_path::user(user_id)))
    }

    // ============================================================================
    // AAA: roles
    // ============================================================================

    /// Create a role. Returns its UUID, generated when not given.
    pub fn aaa_add_role(&self, data: &Value, role_id: Option<&str>) -> Result<String> {
        let role_id = role_id.map(str::to_string).unwrap_or_else(new_id);
        self.send(RequestSpec::post(api_path::role(&role_id)).body(data.clone()))?;
        Ok(role_id)
    }

    pub fn aaa_update_role(&self, role_id: &str, data: &Value) -> Result<()> {
        self.send(RequestSpec::put(api_path::role(role_id)).body(data.clone()))
    }

    pub fn aaa_del_role(&self, role_id: &str) -> Result<()> {
        self.send(RequestSpec::delete(api_path::role(role_id)))
    }

    pub fn aaa_list_roles(&self, format: ListFormat) -> Result<Value> {
        check_format(format, USER_FORMATS)?;
        self.call(RequestSpec::get(api_path::AAA_ROLE).param("format", format))
    }

    pub fn aaa_get_role_data(&self, role_id: &str) -> Result<Value> {
        self.call(RequestSpec::get(api_path::role(role_id)))
    }

    /// Add a directional major -> minor relation. Idempotent.
    pub fn aaa_add_role_role_relation(&self, major_id: &str, minor_id: &str) -> Result<()> {
        self.send(RequestSpec::put(api_path::role_minor(major_id, minor_id)))
    }

    /// Remove a major -> minor relation. Idempotent.
    pub fn aaa_del_role_role_relation(&self, major_id: &str, minor_id: &str) -> Result<()> {
        self.send(RequestSpec::delete(api_path::role_minor(major_id, minor_id)))
    }

    /// Replace the minor roles of a role. An empty list removes them all.
    pub fn aaa_set_role_minors(&self, major_id: &str, minor_ids: &[String]) -> Result<()> {
        self.send(RequestSpec::put(api_path::role_minors(major_id)).json(minor_ids)?)
    }

    pub fn aaa_list_role_minors(&self, major_id: &str) -> Result<Vec<String>> {
        self.http
            .execute(&RequestSpec::get(api_path::role_minors(major_id)))?
            .decode()
    }

    pub fn aaa_list_role_majors(&self, minor_id: &str) -> Result<Vec<String>> {
        self.http
            .execute(&RequestSpec::get(api_path::role_majors(minor_id)))?
            .decode()
    }

    // ============================================================================
    // AAA: user-role relations
    // ============================================================================

    pub fn aaa_add_user_role_relation(&self, user_id: &str, role_id: &str) -> Result<()> {
        self.send(RequestSpec::put(api_path::user_role(user_id, role_id)))
    }

    pub fn aaa_del_user_role_relation(&self, user_id: &str, role_id: &str) -> Result<()> {
        self.send(RequestSpec::delete(api_path::user_role(user_id, role_id)))
    }

    /// Replace the roles of a user. An empty list removes them all.
    pub fn aaa_set_user_roles(&self, user_id: &str, role_ids: &[String]) -> Result<()> {
        self.send(RequestSpec::put(api_path::user_roles(user_id)).json(role_ids)?)
    }

    pub fn aaa_list_user_roles(&self, user_id: &str) -> Result<Vec<String>> {
        self.http
            .execute(&RequestSpec::get(api_path::user_roles(user_id)))?
            .decode()
    }

    pub fn aaa_list_role_users(&self, role_id: &str) -> Result<Vec<String>> {
        self.http
            .execute(&RequestSpec::get(api_path::role_users(role_id)))?
            .decode()
    }

    // ============================================================================
    // Jobs
    // ============================================================================

    /// Create and enqueue a job. Returns its ID, generated when not given.
    pub fn job_add(&self, data: &Value, job_id: Option<&str>) -> Result<String> {
        let job_id = job_id
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}{}", new_id(), new_id()));
        self.send(RequestSpec::post(api_path::job(&job_id)).body(data.clone()))?;
        Ok(job_id)
    }

    pub fn job_get_data(&self, job_id: &str, format: ListFormat) -> Result<Value> {
        check_format(format, JOB_DATA_FORMATS)?;
        self.call(RequestSpec::get(api_path::job(job_id)).param("format", format))
    }

    /// Immediately stop a job
    pub fn job_stop(&self, job_id: &str, options: &JobStopOptions) -> Result<()> {
        let spec = RequestSpec::stop(api_path::job(job_id))
            .param("save", u8::from(options.save))
            .param("force", u8::from(options.force))
            .param_opt("description", options.saved_description.as_deref())
            .param_opt("save_homefs", options.save_homefs.then_some(1));
        self.send(spec)
    }

    /// Jobs of the current user, active or historic
    pub fn job_list(&self, format: ListFormat, historic: bool) -> Result<Value> {
        check_format(format, JOB_LIST_FORMATS)?;
        if let Some(user_id) = self.http.user_id() {
            return self.job_list_all(format, historic, Some(&user_id));
        }
        self.call(
            RequestSpec::get(api_path::LIST_JOBS)
                .param("format", format)
                .param("historic", u8::from(historic)),
        )
    }

    /// All jobs, optionally restricted to one owner
    pub fn job_list_all(
        &self,
        format: ListFormat,
        historic: bool,
        user_id: Option<&str>,
    ) -> Result<Value> {
        check_format(format, JOB_LIST_FORMATS)?;
        self.call(
            RequestSpec::get(api_path::JOB)
                .param("format", format)
                .param("historic", u8::from(historic))
                .param_opt("user", user_id),
        )
    }

    /// Forward TCP ports from the Internet to the access node of the job
    pub fn job_forward(&self, job_id: &str, tcp_ports: &[u16]) -> Result<()> {
        if tcp_ports.contains(&0) {
            return Err(VscError::bad_argument("TCP port 0 cannot be forwarded"));
        }
        self.send(RequestSpec::put(api_path::job_forwards(job_id)).json(tcp_ports)?)
    }

    pub fn job_get_forward_map(&self, job_id: &str) -> Result<Vec<ForwardRule>> {
        self.http
            .execute(&RequestSpec::get(api_path::job_forwards(job_id)))?
            .decode()
    }

    // ============================================================================
    // Packages
    // ============================================================================

    pub fn package_get_data(&self, package_id: &str) -> Result<Value> {
        self.call(RequestSpec::get(api_path::package(package_id)))
    }

    /// Create a package. Returns its UUID, generated when not given.
    pub fn package_create(&self, data: &Value, package_id: Option<&str>) -> Result<String> {
        let package_id = package_id.map(str::to_string).unwrap_or_else(new_id);
        self.send(RequestSpec::post(api_path::package(&package_id)).body(data.clone()))?;
        Ok(package_id)
    }

    pub fn package_update(&self, package_id: &str, data: &Value) -> Result<()> {
        self.send(RequestSpec::put(api_path::package(package_id)).body(data.clone()))
    }

    pub fn package_delete(&self, package_id: &str) -> Result<()> {
        self.send(RequestSpec::delete(api_path::package(package_id)))
    }

    /// Packages owned by the caller
    pub fn package_list(&self, format: ListFormat) -> Result<Value> {
        check_format(format, ARTIFACT_FORMATS)?;
        if let Some(user_id) = self.http.user_id() {
            return self.package_list_all(format, Some(&user_id));
        }
        self.call(RequestSpec::get(api_path::LIST_PACKAGES).param("format", format))
    }

    pub fn package_list_all(&self, format: ListFormat, user_id: Option<&str>) -> Result<Value> {
        check_format(format, ARTIFACT_FORMATS)?;
        self.call(
            RequestSpec::get(api_path::PACKAGE)
                .param("format", format)
                .param_opt("user", user_id),
        )
    }

    // ============================================================================
    // Images
    // ============================================================================

    pub fn image_get_data(&self, image_id: &str) -> Result<Value> {
        self.call(RequestSpec::get(api_path::image(image_id)))
    }

    /// Temporary URL to download the image archive
    pub fn image_generate_url(&self, image_id: &str) -> Result<String> {
        self.http
            .execute(&RequestSpec::get(api_path::image_url(image_id)))?
            .decode()
    }

    /// Create an image. Returns its UUID, generated when not given.
    pub fn image_create(&self, data: &Value, image_id: Option<&str>) -> Result<String> {
        let image_id = image_id.map(str::to_string).unwrap_or_else(new_id);
        self.send(RequestSpec::post(api_path::image(&image_id)).body(data.clone()))?;
        Ok(image_id)
    }

    pub fn image_update(&self, image_id: &str, data: &Value) -> Result<()> {
        self.send(RequestSpec::put(api_path::image(image_id)).body(data.clone()))
    }

    pub fn image_delete(&self, image_id: &str) -> Result<()> {
        self.send(RequestSpec::delete(api_path::image(image_id)))
    }

    /// Images owned by the caller
    pub fn image_list(&self, format: ListFormat) -> Result<Value> {
        check_format(format, ARTIFACT_FORMATS)?;
        if let Some(user_id) = self.http.user_id() {
            return self.image_list_all(format, Some(&user_id));
        }
        self.call(RequestSpec::get(api_path::LIST_IMAGES).param("format", format))
    }

    pub fn image_list_all(&self, format: ListFormat, user_id: Option<&str>) -> Result<Value> {
        check_format(format, ARTIFACT_FORMATS)?;
        self.call(
            RequestSpec::get(api_path::IMAGE)
                .param("format", format)
                .param_opt("user", user_id),
        )
    }

    /// Base URLs of the available image receivers
    pub fn image_receiver_base_urls(&self) -> Result<Vec<String>> {
        self.http
            .execute(&RequestSpec::get(api_path::IMAGE_RECEIVER))?
            .decode()
    }

    // ============================================================================
    // Job profiles
    // ============================================================================

    pub fn job_profile_delete(&self, job_profile_id: &str) -> Result<()> {
        self.send(RequestSpec::delete(api_path::job_profile(job_profile_id)))
    }

    /// Job profiles owned by the caller
    pub fn job_profile_list(&self, format: ListFormat) -> Result<Value> {
        check_format(format, ARTIFACT_FORMATS)?;
        if let Some(user_id) = self.http.user_id() {
            return self.job_profile_list_all(format, Some(&user_id));
        }
        self.call(RequestSpec::get(api_path::LIST_JOB_PROFILES).param("format", format))
    }

    pub fn job_profile_list_public(&self, format: ListFormat) -> Result<Value> {
        check_format(format, ARTIFACT_FORMATS)?;
        self.call(RequestSpec::get(api_path::LIST_PUBLIC_JOB_PROFILES).param("format", format))
    }

    pub fn job_profile_list_all(&self, format: ListFormat, user_id: Option<&str>) -> Result<Value> {
        check_format(format, ARTIFACT_FORMATS)?;
        self.call(
            RequestSpec::get(api_path::LIST_JOB_PROFILES)
                .param("format", format)
                .param_opt("user", user_id),
        )
    }
}
