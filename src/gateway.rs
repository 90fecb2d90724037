//! Request handling: admission, cache lookup, generation, cache store.

use crate::cache::{CacheWrite, ReportCache};
use crate::resilience::rate_limiter::{AdmissionController, AdmissionDecision, RateLimitRule};
use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// An earlier turn of the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: String,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub query: String,
    pub language: String,
    /// Network address or equivalent; the admission key.
    pub client_id: String,
    pub user_id: Option<String>,
    #[serde(default)]
    pub history: Vec<Turn>,
}

impl ChatRequest {
    pub fn new(query: impl Into<String>, language: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            language: language.into(),
            client_id: client_id.into(),
            user_id: None,
            history: Vec::new(),
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_history(mut self, history: Vec<Turn>) -> Self {
        self.history = history;
        self
    }

    /// Only opening queries are answered from or written to the cache.
    pub fn is_fresh(&self) -> bool {
        self.history.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    pub text: String,
    pub cached: bool,
    /// Generator that produced `text`; `None` for cache hits.
    pub model: Option<String>,
    pub admission: AdmissionDecision,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedReport {
    pub text: String,
    pub model: String,
}

/// The expensive text-generation step.
#[async_trait]
pub trait ReportGenerator: Send + Sync {
    async fn generate(&self, query: &str, language: &str, history: &[Turn]) -> Result<GeneratedReport>;
}

pub struct ReportGateway {
    cache: Arc<ReportCache>,
    admission: Arc<AdmissionController>,
    rule: RateLimitRule,
    generator: Arc<dyn ReportGenerator>,
}

impl ReportGateway {
    pub fn new(
        cache: Arc<ReportCache>,
        admission: Arc<AdmissionController>,
        generator: Arc<dyn ReportGenerator>,
    ) -> Self {
        Self {
            cache,
            admission,
            rule: RateLimitRule::default(),
            generator,
        }
    }

    pub fn with_rule(mut self, rule: RateLimitRule) -> Self {
        self.rule = rule;
        self
    }

    pub fn cache(&self) -> &ReportCache {
        &self.cache
    }

    /// Answer one request.
    ///
    /// Fails with [`Error::RateLimited`] before touching the cache when the
    /// caller is over budget, and with the generator's error when generation
    /// fails. Cache faults never fail the request.
    pub async fn handle(&self, request: &ChatRequest) -> Result<ChatReply> {
        let admission = self.admission.check_rule(&request.client_id, &self.rule);
        if !admission.allowed {
            return Err(Error::RateLimited(admission));
        }

        let fresh = request.is_fresh();
        let user = request.user_id.as_deref();
        if fresh {
            if let Some(text) = self.cache.lookup(&request.query, &request.language, user).await {
                return Ok(ChatReply {
                    text,
                    cached: true,
                    model: None,
                    admission,
                });
            }
        } else {
            debug!(turns = request.history.len(), "follow-up turn bypasses cache");
        }

        let report = self
            .generator
            .generate(&request.query, &request.language, &request.history)
            .await?;

        if fresh && !report.text.trim().is_empty() {
            let write = CacheWrite::new(&request.query, &report.text, &report.model, &request.language)
                .with_user(user);
            if let Err(e) = self.cache.store(&write).await {
                warn!(store = self.cache.backend_name(), error = %e, "failed to cache generated report");
            }
        }

        Ok(ChatReply {
            text: report.text,
            cached: false,
            model: Some(report.model),
            admission,
        })
    }
}
