use std::collections::HashMap;
use std::time::Duration;

use log::{debug, warn};
use reqwest::blocking::{Client, Response};
use serde::Deserialize;

use crate::config::InstanceConfig;
use crate::error::KrameriusError;
use crate::kramerius::{KrameriusGateway, ObjectMetadata};
use crate::pid::Pid;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// How many children one search request may return. Kramerius hierarchies
/// are shallow; volumes with more direct children than this do not occur in
/// practice.
const MAX_CHILDREN_ROWS: usize = 4000;

/// Solr envelope returned by the K7 client search endpoint.
#[derive(Debug, Deserialize)]
struct SearchResponse {
    response: SearchBody,
}

#[derive(Debug, Deserialize)]
struct SearchBody {
    docs: Vec<SearchDoc>,
}

#[derive(Debug, Deserialize)]
struct SearchDoc {
    pid: String,
    model: Option<String>,
    #[serde(rename = "title.search")]
    title: Option<String>,
}

/// Blocking client for the Kramerius 7 REST API, serving all configured
/// instances.
pub struct KrameriusClient {
    http: Client,
    instances: HashMap<String, InstanceConfig>,
}

impl KrameriusClient {
    pub fn new(instances: HashMap<String, InstanceConfig>) -> Result<Self, KrameriusError> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(KrameriusError::Client)?;

        Ok(Self { http, instances })
    }

    fn base_url(&self, instance: &str) -> Result<&str, KrameriusError> {
        self.instances
            .get(instance)
            .map(|config| config.base_url.trim_end_matches('/'))
            .ok_or_else(|| KrameriusError::UnknownInstance(instance.to_string()))
    }

    fn checked_get(&self, url: &str, query: &[(&str, &str)]) -> Result<Response, KrameriusError> {
        debug!("GET {}", url);
        let response = self
            .http
            .get(url)
            .query(query)
            .send()
            .map_err(|source| KrameriusError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(KrameriusError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(response)
    }

    fn search(
        &self,
        instance: &str,
        query: &str,
        rows: usize,
    ) -> Result<Vec<ObjectMetadata>, KrameriusError> {
        let url = format!("{}/search/api/client/v7.0/search", self.base_url(instance)?);
        let rows = rows.to_string();
        let response = self.checked_get(
            &url,
            &[
                ("q", query),
                ("fl", "pid,model,title.search"),
                ("rows", rows.as_str()),
            ],
        )?;

        let body: SearchResponse = response.json().map_err(|source| KrameriusError::Request {
            url,
            source,
        })?;

        let docs = body
            .response
            .docs
            .into_iter()
            .filter_map(|doc| match doc.pid.parse::<Pid>() {
                Ok(pid) => Some(ObjectMetadata {
                    pid,
                    model: doc.model.unwrap_or_default(),
                    title: doc.title,
                }),
                Err(e) => {
                    warn!("Skipping search result with malformed PID: {}", e);
                    None
                }
            })
            .collect();

        Ok(docs)
    }

    fn item_bytes(
        &self,
        pid: &Pid,
        instance: &str,
        datastream: &str,
    ) -> Result<Vec<u8>, KrameriusError> {
        let url = format!(
            "{}/search/api/v7.0/item/{}/ocr/{}",
            self.base_url(instance)?,
            pid,
            datastream
        );
        let response = self.checked_get(&url, &[])?;
        let bytes = response.bytes().map_err(|source| KrameriusError::Request {
            url,
            source,
        })?;
        Ok(bytes.to_vec())
    }
}

impl KrameriusGateway for KrameriusClient {
    fn object_metadata(
        &self,
        pid: &Pid,
        instance: &str,
    ) -> Result<Option<ObjectMetadata>, KrameriusError> {
        let query = format!("pid:\"{}\"", pid);
        let mut docs = self.search(instance, &query, 1)?;
        Ok(docs.pop())
    }

    fn children_metadata(
        &self,
        pid: &Pid,
        instance: &str,
    ) -> Result<Vec<ObjectMetadata>, KrameriusError> {
        let query = format!("own_parent.pid:\"{}\"", pid);
        self.search(instance, &query, MAX_CHILDREN_ROWS)
    }

    fn alto(&self, pid: &Pid, instance: &str) -> Result<Vec<u8>, KrameriusError> {
        self.item_bytes(pid, instance, "alto")
    }

    fn ocr_text(&self, pid: &Pid, instance: &str) -> Result<String, KrameriusError> {
        let bytes = self.item_bytes(pid, instance, "text")?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}
