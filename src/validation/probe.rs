//! Ground-truth probes used by the corrector

use crate::agent::executor::CommandRunner;
use crate::core::error::{ReconError, Result};
use async_trait::async_trait;
use regex::Regex;
use reqwest::redirect::Policy;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

/// A fact to check against the live target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fact {
    Port { ip: String, port: u16, protocol: String },
    WebPath { url: String },
}

/// What a probe observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    Port { open: bool, service: Option<String> },
    Status(u16),
}

#[async_trait]
pub trait FactProbe: Send + Sync {
    async fn probe(&self, fact: &Fact) -> Result<Observation>;
}

/// Re-scans a single port with `nmap -p <port> <ip>`, adding `-sU` for udp
pub struct NmapPortProbe {
    runner: Arc<dyn CommandRunner>,
}

impl NmapPortProbe {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

/// Lowercased transport name, `tcp` when unset
pub fn normalize_protocol(protocol: &str) -> String {
    let protocol = protocol.trim().to_ascii_lowercase();
    if protocol.is_empty() {
        "tcp".to_string()
    } else {
        protocol
    }
}

/// The `<port>/<proto> <state> <service>` line for a port in nmap output.
/// Only lines for the requested protocol count.
pub fn parse_nmap_port(output: &str, port: u16, protocol: &str) -> Observation {
    let protocol = normalize_protocol(protocol);
    let pattern = Regex::new(&format!(
        r"(?m)^{}/{}\s+(\S+)(?:\s+(\S+))?",
        port,
        regex::escape(&protocol)
    ));
    let found = pattern.ok().and_then(|re| {
        re.captures(output).map(|caps| {
            let state = caps.get(1).map(|m| m.as_str()).unwrap_or("");
            let service = caps.get(2).map(|m| m.as_str().to_string());
            (state == "open", service)
        })
    });
    match found {
        Some((open, service)) => Observation::Port { open, service },
        None => Observation::Port {
            open: false,
            service: None,
        },
    }
}

fn nmap_port_command(ip: &str, port: u16, protocol: &str) -> String {
    match normalize_protocol(protocol).as_str() {
        "udp" => format!("nmap -sU -p {} {}", port, ip),
        _ => format!("nmap -p {} {}", port, ip),
    }
}

#[async_trait]
impl FactProbe for NmapPortProbe {
    async fn probe(&self, fact: &Fact) -> Result<Observation> {
        match fact {
            Fact::Port { ip, port, protocol } => {
                let output = self.runner.run(&nmap_port_command(ip, *port, protocol)).await?;
                Ok(parse_nmap_port(&output, *port, protocol))
            }
            other => Err(ReconError::Probe(format!("port probe cannot check {:?}", other))),
        }
    }
}

/// HEAD request without following redirects
pub struct HttpPathProbe {
    client: Client,
}

impl HttpPathProbe {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .redirect(Policy::none())
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl FactProbe for HttpPathProbe {
    async fn probe(&self, fact: &Fact) -> Result<Observation> {
        match fact {
            Fact::WebPath { url } => {
                let response = self.client.head(url).send().await?;
                Ok(Observation::Status(response.status().as_u16()))
            }
            other => Err(ReconError::Probe(format!("http probe cannot check {:?}", other))),
        }
    }
}
