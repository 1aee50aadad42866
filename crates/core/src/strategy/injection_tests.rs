// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::model::{ContainerId, DockerId, MonitoringConfig, SessionId};
use std::time::Duration;

fn ctx() -> StrategyContext {
    StrategyContext {
        container_id: ContainerId(42),
        session_id: SessionId(7),
        docker_id: DockerId("s-abc".into()),
        silence_duration: Duration::from_secs(12),
        last_output: Vec::new(),
        config: MonitoringConfig::default(),
    }
}

#[test]
fn expands_all_known_placeholders() {
    let out = expand("echo {container_id}={docker_id}\t{timestamp}", &ctx());
    assert!(out.contains("42"));
    assert!(out.contains("s-abc"));
    assert!(!out.contains('{'));
    assert!(out.ends_with('\n'));
}

#[test]
fn unknown_placeholders_remain_literal() {
    let out = expand("do {unknown_thing} now", &ctx());
    assert!(out.contains("{unknown_thing}"));
}

#[test]
fn newline_normalization_handles_any_trailing_mix() {
    assert_eq!(expand("abc", &ctx()), "abc\n");
    assert_eq!(expand("abc\n", &ctx()), "abc\n");
    assert_eq!(expand("abc\r\n", &ctx()), "abc\n");
    assert_eq!(expand("abc\n\n\n", &ctx()), "abc\n");
    assert_eq!(expand("", &ctx()), "\n");
}

#[test]
fn validate_rejects_empty_command() {
    let strategy = InjectionStrategy::new(Arc::new(NoopWriter));
    let mut cfg = MonitoringConfig::default();
    cfg.injection_command = Some(String::new());
    assert!(strategy.validate(&cfg).is_err());
}

struct NoopWriter;
impl InputWriter for NoopWriter {
    fn write_input<'a>(
        &'a self,
        _bytes: &'a [u8],
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = anyhow::Result<()>> + Send + 'a>> {
        Box::pin(async { Ok(()) })
    }
}
