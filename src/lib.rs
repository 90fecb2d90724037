//! # trust-cache
//!
//! 安全信任报告的查询缓存与请求准入子系统。
//!
//! Query caching and request admission for AI-generated security-trust
//! reports.
//!
//! ## Overview
//!
//! A free-text question about a product, company or URL is expensive to
//! answer. This crate keeps the answers so the same question is not answered
//! twice, and limits how often one caller may reach the generation step.
//!
//! ## Core Guarantees
//!
//! - **Stable keys**: one normalizer feeds every tier, so `"GitLab"` and
//!   `"https://gitlab.com/"` address the same entry
//! - **Per-language entries**: the same query in two languages never shares an answer
//! - **Seven-day retention** in every tier, checked at read time and swept in maintenance
//! - **Fail open**: a broken cache degrades to generation, never to an error
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use trust_cache::cache::ReportCache;
//! use trust_cache::config::TrustCacheConfig;
//! use trust_cache::gateway::{ChatRequest, ReportGateway, ReportGenerator};
//!
//! async fn serve(generator: Arc<dyn ReportGenerator>) -> trust_cache::Result<()> {
//!     let config = TrustCacheConfig::from_yaml_file("trust-cache.yaml")?.apply_env()?;
//!     let cache = Arc::new(ReportCache::new(config.cache_config(), config.build_store().await?));
//!     let gateway = ReportGateway::new(cache, config.build_admission()?, generator)
//!         .with_rule(config.rule());
//!
//!     let reply = gateway.handle(&ChatRequest::new("gitlab.com", "en", "203.0.113.7")).await?;
//!     println!("cached={} {}", reply.cached, reply.text);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`cache`] | Normalization, keys, the three storage tiers and the best-effort façade |
//! | [`resilience`] | Fixed-window admission control |
//! | [`gateway`] | Request handling that composes admission, cache and generation |
//! | [`config`] | YAML and environment configuration |
//! | [`transport`] | HTTP client for the shared document service |

pub mod cache;
pub mod config;
pub mod gateway;
pub mod resilience;
pub mod transport;

pub use cache::{normalize, CacheKey, CacheStore, ReportCache};
pub use config::TrustCacheConfig;
pub use gateway::{ChatReply, ChatRequest, ReportGateway, ReportGenerator};
pub use resilience::rate_limiter::{AdmissionController, AdmissionDecision};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
