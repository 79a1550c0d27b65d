//! Verification of parsed facts against the live target and datasets

use crate::llm::cache::DiskCache;
use crate::schema::structure::{normalize_placeholder, STATUS_CODES};
use crate::validation::catalogue::{KernelList, OsCatalogue};
use crate::validation::probe::{normalize_protocol, FactProbe, Fact, Observation};
use reqwest::StatusCode;
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Reason stored when a probe could not reach the target
pub const PROBE_FAILURE_REASON: &str = "Error or Timeout";

/// `"kind:param" -> observed value`, persisted as JSON
pub struct CorrectnessCache {
    inner: DiskCache,
}

impl CorrectnessCache {
    pub fn new(inner: DiskCache) -> Self {
        Self { inner }
    }

    pub fn key(kind: &str, param: &str) -> String {
        format!("{}:{}", kind, param)
    }

    pub fn get(&self, kind: &str, param: &str) -> Option<Value> {
        self.inner.get(&Self::key(kind, param))
    }

    pub fn set(&self, kind: &str, param: &str, value: Value) {
        self.inner.set(&Self::key(kind, param), value)
    }
}

pub struct Corrector {
    target_ip: String,
    web_scheme: String,
    cache: Arc<CorrectnessCache>,
    port_probe: Option<Arc<dyn FactProbe>>,
    path_probe: Option<Arc<dyn FactProbe>>,
    catalogue: Option<OsCatalogue>,
    kernels: Option<KernelList>,
    status_codes: Vec<String>,
}

impl Corrector {
    pub fn new(target_ip: &str, cache: Arc<CorrectnessCache>) -> Self {
        Self {
            target_ip: target_ip.to_string(),
            web_scheme: "http".into(),
            cache,
            port_probe: None,
            path_probe: None,
            catalogue: None,
            kernels: None,
            status_codes: STATUS_CODES.iter().map(|c| c.to_string()).collect(),
        }
    }

    /// Buckets kept under `web_directories_status`
    pub fn with_status_codes<S: AsRef<str>>(mut self, codes: &[S]) -> Self {
        self.status_codes = codes.iter().map(|c| c.as_ref().to_string()).collect();
        self
    }

    pub fn with_port_probe(mut self, probe: Arc<dyn FactProbe>) -> Self {
        self.port_probe = Some(probe);
        self
    }

    pub fn with_path_probe(mut self, probe: Arc<dyn FactProbe>) -> Self {
        self.path_probe = Some(probe);
        self
    }

    pub fn with_catalogue(mut self, catalogue: OsCatalogue) -> Self {
        self.catalogue = Some(catalogue);
        self
    }

    pub fn with_kernels(mut self, kernels: KernelList) -> Self {
        self.kernels = Some(kernels);
        self
    }

    pub fn with_web_scheme(mut self, scheme: &str) -> Self {
        self.web_scheme = scheme.to_string();
        self
    }

    /// Verify ports, OS fields and web paths in a validated patch
    pub async fn correct(&self, mut value: Value) -> Value {
        if let Some(probe) = &self.port_probe {
            self.correct_ports(&mut value, probe.as_ref()).await;
        }
        self.correct_os(&mut value);
        if let Some(probe) = &self.path_probe {
            self.correct_web_paths(&mut value, probe.as_ref()).await;
        }
        value
    }

    async fn correct_ports(&self, value: &mut Value, probe: &dyn FactProbe) {
        let Some(services) = value.pointer_mut("/target/services").and_then(Value::as_array_mut) else {
            return;
        };
        let mut kept = Vec::with_capacity(services.len());
        for mut service in std::mem::take(services) {
            let Some(port) = service["port"].as_u64().and_then(|p| u16::try_from(p).ok()) else {
                tracing::debug!(service = %service, "dropping service without a valid port");
                continue;
            };
            let protocol = normalize_protocol(service["protocol"].as_str().unwrap_or(""));
            match self.port_state(probe, port, &protocol).await {
                Some((true, observed)) => {
                    if let Some(name) = observed.filter(|s| !s.is_empty()) {
                        service["service"] = Value::String(name);
                    }
                    kept.push(service);
                }
                Some((false, _)) => tracing::debug!(port, protocol = %protocol, "port not open, dropped"),
                None => tracing::debug!(port, protocol = %protocol, "port probe failed, dropped"),
            }
        }
        *services = kept;
    }

    /// `(open, service)` from cache or a fresh probe; `None` on probe failure
    async fn port_state(
        &self,
        probe: &dyn FactProbe,
        port: u16,
        protocol: &str,
    ) -> Option<(bool, Option<String>)> {
        let param = format!("{}:{}/{}", self.target_ip, port, protocol);
        if let Some(cached) = self.cache.get("port", &param) {
            let open = cached["open"].as_bool().unwrap_or(false);
            let service = cached["service"].as_str().map(str::to_string);
            return Some((open, service));
        }

        let fact = Fact::Port {
            ip: self.target_ip.clone(),
            port,
            protocol: protocol.to_string(),
        };
        match probe.probe(&fact).await {
            Ok(Observation::Port { open, service }) => {
                self.cache
                    .set("port", &param, json!({"open": open, "service": service.clone()}));
                Some((open, service))
            }
            Ok(other) => {
                tracing::warn!(port, observation = ?other, "unexpected port observation");
                None
            }
            Err(e) => {
                tracing::warn!(port, error = %e, "port probe failed");
                None
            }
        }
    }

    fn correct_os(&self, value: &mut Value) {
        let Some(os) = value.pointer_mut("/target/os").filter(|os| os.is_object()) else {
            return;
        };

        if let Some(catalogue) = self.catalogue.as_ref().filter(|c| !c.is_empty()) {
            let name = os["distribution"]["name"].as_str().unwrap_or("").to_string();
            let version = os["distribution"]["version"].as_str().unwrap_or("").to_string();
            let arch = os["architecture"].as_str().unwrap_or("").to_string();

            if !name.is_empty() && catalogue.distribution(&name).is_none() {
                tracing::debug!(name, "unknown distribution blanked");
                os["distribution"]["name"] = json!("");
                os["distribution"]["version"] = json!("");
            } else if !version.is_empty() && !name.is_empty() && !catalogue.has_version(&name, &version) {
                tracing::debug!(name, version, "unknown version blanked");
                os["distribution"]["version"] = json!("");
            }
            if !arch.is_empty() && !catalogue.has_architecture(&name, &arch) {
                tracing::debug!(arch, "unknown architecture blanked");
                os["architecture"] = json!("");
            }
        }

        if let Some(kernels) = self.kernels.as_ref().filter(|k| !k.is_empty()) {
            let kernel = os["kernel"].as_str().unwrap_or("").to_string();
            if !kernel.is_empty() && !kernels.contains(&kernel) {
                tracing::debug!(kernel, "unknown kernel blanked");
                os["kernel"] = json!("");
            }
        }
    }

    async fn correct_web_paths(&self, value: &mut Value, probe: &dyn FactProbe) {
        let Some(statuses) = value
            .get_mut("web_directories_status")
            .and_then(Value::as_object_mut)
        else {
            return;
        };

        let mut found: Vec<String> = Vec::new();
        for paths in statuses.values() {
            if let Some(paths) = paths.as_object() {
                found.extend(paths.keys().filter(|p| !p.is_empty()).cloned());
            }
        }

        let mut corrected: Map<String, Value> = self
            .status_codes
            .iter()
            .map(|code| (code.clone(), Value::Object(Map::new())))
            .collect();

        for path in found {
            if !is_valid_path(&path) {
                tracing::debug!(path, "invalid web path discarded");
                continue;
            }
            let Some((code, reason)) = self.path_status(probe, &path).await else {
                continue;
            };
            match corrected.get_mut(&code).and_then(Value::as_object_mut) {
                Some(bucket) => {
                    bucket.insert(path, Value::String(reason));
                }
                None => tracing::debug!(path, code, "status outside the tracked codes"),
            }
        }

        for bucket in corrected.values_mut() {
            if let Some(map) = bucket.as_object_mut() {
                normalize_placeholder(map);
            }
        }
        *statuses = corrected;
    }

    /// Observed `(code, canonical reason)`; `None` when the probe failed
    async fn path_status(&self, probe: &dyn FactProbe, path: &str) -> Option<(String, String)> {
        let param = format!("{}{}", self.target_ip, path);
        if let Some(cached) = self.cache.get("path", &param) {
            let code = cached[0].as_str().unwrap_or("404").to_string();
            let reason = cached[1].as_str().unwrap_or("").to_string();
            return (reason != PROBE_FAILURE_REASON).then_some((code, reason));
        }

        let url = format!("{}://{}{}", self.web_scheme, self.target_ip, path);
        match probe.probe(&Fact::WebPath { url: url.clone() }).await {
            Ok(Observation::Status(status)) => {
                let code = status.to_string();
                let reason = canonical_reason(status);
                self.cache.set("path", &param, json!([code.clone(), reason.clone()]));
                Some((code, reason))
            }
            Ok(other) => {
                tracing::warn!(url, observation = ?other, "unexpected path observation");
                None
            }
            Err(e) => {
                tracing::warn!(url, error = %e, "path probe failed");
                self.cache
                    .set("path", &param, json!(["404", PROBE_FAILURE_REASON]));
                None
            }
        }
    }
}

/// Standard reason phrase for an HTTP status
pub fn canonical_reason(status: u16) -> String {
    StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("")
        .to_string()
}

/// Absolute URL path without whitespace or control characters
pub fn is_valid_path(path: &str) -> bool {
    path.starts_with('/') && !path.chars().any(|c| c.is_whitespace() || c.is_control())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::{ReconError, Result};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    struct ScriptedProbe {
        open_ports: Vec<u16>,
        open_udp_ports: Vec<u16>,
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl FactProbe for ScriptedProbe {
        async fn probe(&self, fact: &Fact) -> Result<Observation> {
            *self.calls.lock() += 1;
            match fact {
                Fact::Port { port, protocol, .. } if protocol == "udp" => Ok(Observation::Port {
                    open: self.open_udp_ports.contains(port),
                    service: Some("probed-udp".into()),
                }),
                Fact::Port { port, .. } => Ok(Observation::Port {
                    open: self.open_ports.contains(port),
                    service: Some("probed".into()),
                }),
                Fact::WebPath { url } if url.ends_with("/timeout") => {
                    Err(ReconError::Probe("timed out".into()))
                }
                Fact::WebPath { url } if url.ends_with("/admin") => Ok(Observation::Status(403)),
                Fact::WebPath { .. } => Ok(Observation::Status(404)),
            }
        }
    }

    fn probe(open_ports: Vec<u16>) -> Arc<ScriptedProbe> {
        Arc::new(ScriptedProbe {
            open_ports,
            open_udp_ports: Vec::new(),
            calls: Mutex::new(0),
        })
    }

    fn cache() -> Arc<CorrectnessCache> {
        Arc::new(CorrectnessCache::new(DiskCache::in_memory()))
    }

    #[tokio::test]
    async fn test_closed_ports_dropped_and_service_overwritten() {
        let p = probe(vec![22]);
        let corrector = Corrector::new("10.0.0.1", cache()).with_port_probe(p.clone());
        let value = json!({"target": {"os": {}, "services": [
            {"port": 22, "protocol": "tcp", "service": "guess"},
            {"port": 23, "protocol": "tcp", "service": "telnet"}
        ]}});
        let out = corrector.correct(value).await;
        let services = out["target"]["services"].as_array().unwrap();
        assert_eq!(services.len(), 1);
        assert_eq!(services[0]["service"], "probed");
    }

    #[tokio::test]
    async fn test_port_results_cached() {
        let p = probe(vec![22]);
        let corrector = Corrector::new("10.0.0.1", cache()).with_port_probe(p.clone());
        let value = json!({"target": {"services": [{"port": 22, "protocol": "tcp"}]}});
        corrector.correct(value.clone()).await;
        corrector.correct(value).await;
        assert_eq!(*p.calls.lock(), 1);
    }

    #[tokio::test]
    async fn test_udp_service_checked_as_udp() {
        let p = Arc::new(ScriptedProbe {
            open_ports: Vec::new(),
            open_udp_ports: vec![161],
            calls: Mutex::new(0),
        });
        let c = cache();
        let corrector = Corrector::new("10.0.0.1", c.clone()).with_port_probe(p.clone());
        let value = json!({"target": {"services": [
            {"port": 161, "protocol": "udp", "service": "guess"},
            {"port": 161, "protocol": "tcp", "service": "guess"}
        ]}});
        let out = corrector.correct(value).await;
        let services = out["target"]["services"].as_array().unwrap();
        assert_eq!(services.len(), 1);
        assert_eq!(services[0]["protocol"], "udp");
        assert_eq!(services[0]["service"], "probed-udp");
        assert_eq!(*p.calls.lock(), 2);
        assert_eq!(c.get("port", "10.0.0.1:161/udp").unwrap()["open"], true);
        assert_eq!(c.get("port", "10.0.0.1:161/tcp").unwrap()["open"], false);
    }

    #[tokio::test]
    async fn test_web_paths_moved_to_observed_code() {
        let c = cache();
        let corrector = Corrector::new("10.0.0.1", c.clone()).with_path_probe(probe(vec![]));
        let value = json!({"web_directories_status": {
            "200": {"/does-not-exist": "", "/admin": "OK", "bad path": "OK", "/timeout": "OK"}
        }});
        let out = corrector.correct(value).await;
        let web = &out["web_directories_status"];
        assert_eq!(web["200"], json!({"": ""}));
        assert_eq!(web["404"], json!({"/does-not-exist": "Not Found"}));
        assert_eq!(web["403"], json!({"/admin": "Forbidden"}));
        assert_eq!(
            c.get("path", "10.0.0.1/timeout"),
            Some(json!(["404", PROBE_FAILURE_REASON]))
        );
    }

    #[tokio::test]
    async fn test_os_fields_checked_against_catalogue() {
        let catalogue = OsCatalogue::from_json_str(
            r#"{"ubuntu": {"versions": ["8.04"], "architecture": ["x86_64"]}}"#,
        )
        .unwrap();
        let corrector = Corrector::new("10.0.0.1", cache())
            .with_catalogue(catalogue)
            .with_kernels(KernelList::new(vec!["2.6.24-16-server".into()]));
        let value = json!({"target": {"os": {
            "name": "Linux",
            "distribution": {"name": "ubuntu", "version": "99.99"},
            "kernel": "2.6.24",
            "architecture": "sparc"
        }}});
        let out = corrector.correct(value).await;
        let os = &out["target"]["os"];
        assert_eq!(os["distribution"]["name"], "ubuntu");
        assert_eq!(os["distribution"]["version"], "");
        assert_eq!(os["architecture"], "");
        assert_eq!(os["kernel"], "2.6.24");
    }

    #[tokio::test]
    async fn test_web_paths_bucketed_by_configured_codes() {
        let corrector = Corrector::new("10.0.0.1", cache())
            .with_path_probe(probe(vec![]))
            .with_status_codes(&["403", "404"]);
        let value = json!({"web_directories_status": {"200": {"/admin": "OK", "/gone": "OK"}}});
        let out = corrector.correct(value).await;
        assert_eq!(
            out["web_directories_status"],
            json!({"403": {"/admin": "Forbidden"}, "404": {"/gone": "Not Found"}})
        );
    }

    #[test]
    fn test_canonical_reasons() {
        assert_eq!(canonical_reason(404), "Not Found");
        assert_eq!(canonical_reason(301), "Moved Permanently");
    }
}
