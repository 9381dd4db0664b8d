// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.

mod common;

use common::{load, init_tracing, MockChain, Signer, ALICE, BOB, CONTRACT, GUESTBOOK};
use hyperflow::{ActionRef, Effect, Flow, InputResult, LogLevel, TxStatus};
use serde_json::json;
use std::time::Duration;

async fn button_action(flow: &Flow<MockChain>, label: &str) -> anyhow::Result<ActionRef> {
    let matches = flow
        .match_prompts(&format!("button('{label}', _, _)"))
        .await?;
    matches
        .first()
        .and_then(|found| found.action().cloned())
        .ok_or_else(|| anyhow::anyhow!("no button labelled {label}"))
}

async fn button_attrs(flow: &Flow<MockChain>, label: &str) -> anyhow::Result<String> {
    let matches = flow
        .match_prompts(&format!("button('{label}', Attrs, _)"))
        .await?;
    let attrs = matches
        .first()
        .and_then(|found| found.binding("Attrs"))
        .ok_or_else(|| anyhow::anyhow!("no button labelled {label}"))?;
    Ok(attrs.to_string())
}

#[tokio::test]
async fn test_detects_guestbook() -> anyhow::Result<()> {
    init_tracing();
    let chain = MockChain::new();
    let flow = load(GUESTBOOK, &chain);
    flow.init(ALICE, 10, Signer::new(ALICE)).await?;

    assert_eq!(flow.prompt_count("button('Create Guestbook', _, _)").await?, 1);
    assert_eq!(flow.prompt_count("button('Open My Guestbook', _, _)").await?, 0);

    chain.create_for(ALICE);
    flow.set_block_number(20).await?;

    assert_eq!(flow.prompt_count("button('Create Guestbook', _, _)").await?, 0);
    assert_eq!(flow.prompt_count("button('Open My Guestbook', _, _)").await?, 1);
    assert_eq!(flow.prompt_count("text('Your guestbook: #', 1)").await?, 1);
    Ok(())
}

#[tokio::test]
async fn test_creates_and_displays_an_entry() -> anyhow::Result<()> {
    let chain = MockChain::new();
    let book = chain.create_for(BOB);
    let flow = load(GUESTBOOK, &chain);
    flow.init(ALICE, 10, Signer::new(ALICE)).await?;

    let open = button_action(&flow, "Open a Guestbook").await?;
    assert!(flow.execute(&open).await?.succeeded);

    assert_eq!(flow.prompt_count("input(address, owner)").await?, 1);
    assert_eq!(flow.prompt_count("debug(viewing(_))").await?, 0);
    assert_eq!(button_attrs(&flow, "Open Guestbook").await?, "[enabled(false)]");

    let inputs = flow.match_prompts("input(address, Name)").await?;
    let name = inputs[0].binding("Name").and_then(|n| n.text()).unwrap_or_default();
    assert_eq!(name, "owner");
    assert_eq!(
        flow.handle_input(&name, BOB).await?,
        InputResult::Accepted { value: json!(BOB) }
    );
    assert_eq!(button_attrs(&flow, "Open Guestbook").await?, "[enabled(true)]");

    let view = button_action(&flow, "Open Guestbook").await?;
    let execution = flow.execute(&view).await?;
    assert!(execution.succeeded);
    assert!(execution.effects.is_empty());

    assert_eq!(flow.prompt_count(&format!("debug(viewing({book}))")).await?, 1);
    assert_eq!(flow.prompt_count("debug(latest_entry(_))").await?, 0);
    assert_eq!(button_attrs(&flow, "Submit").await?, "[enabled(false)]");

    assert!(flow.handle_input("tip", 0.2).await?.is_accepted());
    assert!(flow.handle_input("message", "Good job!").await?.is_accepted());
    assert_eq!(button_attrs(&flow, "Submit").await?, "[enabled(true)]");

    let submit = button_action(&flow, "Submit").await?;
    let execution = flow.execute(&submit).await?;
    assert_eq!(execution.effects.len(), 2);
    assert_eq!(execution.effects[0], Effect::submitted("0xtx1"));
    assert!(matches!(
        execution.effects[1],
        Effect::Log { level: LogLevel::Notice, .. }
    ));

    let entries = chain.entries(book);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].author, ALICE);
    assert_eq!(entries[0].wei, "200000000000000000");
    assert_eq!(entries[0].message, "Good job!");

    // The entry count was read at block 10 before signing.
    assert_eq!(flow.prompt_count("debug(latest_entry(_))").await?, 0);
    flow.set_block_number(20).await?;
    assert_eq!(flow.prompt_count("debug(viewing(_))").await?, 1);
    assert_eq!(
        flow.prompt_count("debug(latest_entry(entry(_, 200000000000000000, 'Good job!')))")
            .await?,
        1
    );
    Ok(())
}

#[tokio::test]
async fn test_transaction_outcome_is_broadcast() -> anyhow::Result<()> {
    let chain = MockChain::new();
    let flow = load(GUESTBOOK, &chain);
    let mut outcomes = flow.subscribe();
    flow.init(ALICE, 10, Signer::new(ALICE)).await?;

    let create = button_action(&flow, "Create Guestbook").await?;
    let execution = flow.execute(&create).await?;
    assert_eq!(execution.effects[0], Effect::submitted("0xtx1"));
    assert!(matches!(
        execution.effects[1],
        Effect::Log { level: LogLevel::Success, .. }
    ));

    let deferred = tokio::time::timeout(Duration::from_secs(2), outcomes.recv()).await??;
    assert_eq!(deferred, Effect::confirmed("0xtx1"));
    assert_eq!(flow.effect_count("tx(confirmed, _)").await?, 1);
    assert_eq!(flow.effect_count("tx(_, '0xtx1')").await?, 2);

    flow.set_block_number(11).await?;
    assert_eq!(flow.prompt_count("button('Open My Guestbook', _, _)").await?, 1);
    Ok(())
}

#[tokio::test]
async fn test_failed_transaction_is_reported_later() -> anyhow::Result<()> {
    let chain = MockChain::new().failing_transactions();
    let flow = load(GUESTBOOK, &chain);
    let mut outcomes = flow.subscribe();
    flow.init(ALICE, 10, Signer::new(ALICE)).await?;

    let create = button_action(&flow, "Create Guestbook").await?;
    flow.execute(&create).await?;

    let deferred = tokio::time::timeout(Duration::from_secs(2), outcomes.recv()).await??;
    match deferred {
        Effect::Transaction { status, id, error } => {
            assert_eq!(status, TxStatus::Failed);
            assert_eq!(id, "0xtx1");
            assert!(error.unwrap_or_default().contains("execution reverted"));
        }
        other => panic!("unexpected effect {other:?}"),
    }
    assert_eq!(flow.effect_count("tx(failed, _, _)").await?, 1);
    Ok(())
}

const CREATE_THEN_FAIL: &str = r#"
address(guestbook, '{{contractAddr}}').
abi(guestbook, [ create ]).

prompt :-
  show [
    button('Create', [
      call_fn(guestbook, create, []),
      X is missing + 1,
      log(success, X)
    ])
  ].
"#;

#[tokio::test]
async fn test_transactions_outlive_a_failing_action() -> anyhow::Result<()> {
    let chain = MockChain::new();
    let flow = load(CREATE_THEN_FAIL, &chain);
    let mut outcomes = flow.subscribe();
    flow.init(ALICE, 10, Signer::new(ALICE)).await?;

    let create = button_action(&flow, "Create").await?;
    assert!(flow.execute(&create).await.is_err());
    assert_eq!(chain.calls("create()"), 1);
    assert_eq!(flow.effect_count("tx(submitted, '0xtx1')").await?, 1);

    let deferred = tokio::time::timeout(Duration::from_secs(2), outcomes.recv()).await??;
    assert_eq!(deferred, Effect::confirmed("0xtx1"));
    assert_eq!(flow.effect_count("tx(confirmed, '0xtx1')").await?, 1);
    Ok(())
}

#[tokio::test]
async fn test_hook_receives_call_details() -> anyhow::Result<()> {
    let chain = MockChain::new();
    let flow = load(GUESTBOOK, &chain);
    flow.init(ALICE, 10, Signer::new(ALICE)).await?;

    let request = chain.requests().into_iter().next().expect("one view call");
    assert_eq!(request.address, CONTRACT);
    assert_eq!(request.contract, "guestbook");
    assert_eq!(request.signature, "guestbooks(address)");
    assert_eq!(request.param_types, vec!["address"]);
    assert_eq!(request.return_types, vec!["uint256"]);
    assert_eq!(request.args, vec![json!(ALICE)]);
    assert!(request.mutability.view);
    assert!(request.value.is_none());
    assert_eq!(request.block.number, 10);
    assert_eq!(request.block.account, ALICE);
    Ok(())
}

const COUNTER: &str = r#"
address(guestbook, '{{contractAddr}}').
abi(guestbook, [ sign(uint256, string): payable ]).

prompt :-
  show [
    button('Bump', [
      ( get(count, N) -> true ; N = 0 ),
      call_fn(guestbook, sign(1, bump), [], _),
      N1 is N + 1,
      set(count, N1)
    ])
  ].

prompt :- get(count, N), show [ text(count, N) ].
"#;

#[tokio::test]
async fn test_concurrent_executions_are_serialized() -> anyhow::Result<()> {
    let chain = MockChain::new().with_delay(Duration::from_millis(20));
    chain.create_for(ALICE);
    let flow = load(COUNTER, &chain);
    flow.init(ALICE, 1, Signer::new(ALICE)).await?;
    let bump = button_action(&flow, "Bump").await?;

    let first = tokio::spawn({
        let flow = flow.clone();
        let bump = bump.clone();
        async move { flow.execute(&bump).await }
    });
    let second = tokio::spawn({
        let flow = flow.clone();
        let bump = bump.clone();
        async move { flow.execute(&bump).await }
    });
    assert!(first.await??.succeeded);
    assert!(second.await??.succeeded);

    assert_eq!(chain.calls("sign(uint256,string)"), 2);
    assert_eq!(flow.prompt_count("text(count, 2)").await?, 1);
    Ok(())
}
