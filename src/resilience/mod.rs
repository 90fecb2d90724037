//! 准入控制模块：按客户端标识进行固定窗口限流，保护昂贵的生成路径。
//!
//! # Request Admission Module
//!
//! Gates the report generation path with a fixed-window counter per caller.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`rate_limiter::AdmissionController`] | In-memory fixed-window counter table |
//! | [`rate_limiter::AdmissionDecision`] | Outcome plus HTTP headers and status |
//! | [`rate_limiter::RateLimitRule`] | Requests allowed per window |
//!
//! ```rust
//! use trust_cache::resilience::rate_limiter::AdmissionController;
//! use std::time::Duration;
//!
//! let limiter = AdmissionController::new();
//! let decision = limiter.check("203.0.113.7", 20, Duration::from_secs(60));
//! assert!(decision.allowed);
//! assert_eq!(decision.remaining, 19);
//! ```
//!
//! The table lives in one process. Behind a load balancer every instance
//! keeps its own budget, so the limit is approximate; it is meant for abuse
//! mitigation, not quota enforcement.

pub mod rate_limiter;
