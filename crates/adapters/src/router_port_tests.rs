// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::collections::HashMap;

#[tokio::test]
async fn fake_records_execute_and_query_calls() {
    let fake = FakeRouterPort::new();
    let cmd = Command::add("/ip/firewall/mangle", HashMap::new());
    fake.execute(cmd.clone()).await.unwrap();
    fake.query(StateQuery::new("/ip/route")).await.unwrap();

    let calls = fake.calls();
    assert_eq!(calls.len(), 2);
    assert!(matches!(&calls[0], RecordedCall::Execute(c) if c.path == cmd.path));
    assert!(matches!(&calls[1], RecordedCall::Query(q) if q.path == "/ip/route"));
}

#[tokio::test]
async fn fake_default_execute_result_is_success() {
    let fake = FakeRouterPort::new();
    let result = fake.execute(Command::print("/ip/route", HashMap::new())).await.unwrap();
    assert!(result.success);
}

#[tokio::test]
async fn fake_scripted_results_are_consumed_in_order() {
    let fake = FakeRouterPort::new();
    fake.push_execute_result(Err(RouterPortError::Rejected("busy".to_string())));
    fake.push_execute_result(Ok(CommandResult::ok(Some("*7".to_string()), Vec::new())));

    let first = fake.execute(Command::print("/ip/route", HashMap::new())).await;
    assert!(first.is_err());
    let second = fake.execute(Command::print("/ip/route", HashMap::new())).await.unwrap();
    assert_eq!(second.id.as_deref(), Some("*7"));
}

#[tokio::test]
async fn fake_query_default_is_empty_resources() {
    let fake = FakeRouterPort::new();
    let resources = fake.query(StateQuery::new("/ip/firewall/mangle")).await.unwrap();
    assert!(resources.is_empty());
}
