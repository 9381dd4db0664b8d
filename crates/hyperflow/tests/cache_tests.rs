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

use common::{load, MockChain, Signer, ALICE, GUESTBOOK};
use hyperflow::{ActionRef, Flow, FlowError, HookError};

async fn action(flow: &Flow<MockChain>, label: &str) -> anyhow::Result<ActionRef> {
    let matches = flow.match_prompts(&format!("button('{label}', _, _)")).await?;
    matches
        .first()
        .and_then(|found| found.action().cloned())
        .ok_or_else(|| anyhow::anyhow!("no button labelled {label}"))
}

#[tokio::test]
async fn test_view_calls_are_cached_per_block() -> anyhow::Result<()> {
    let chain = MockChain::new();
    let flow = load(GUESTBOOK, &chain);
    flow.init(ALICE, 10, Signer::new(ALICE)).await?;
    assert_eq!(chain.calls("guestbooks(address)"), 1);

    // Same block: a second resolution pass reads from the cache.
    flow.set_block_number(10).await?;
    flow.get_prompts().await?;
    assert_eq!(chain.calls("guestbooks(address)"), 1);

    flow.set_block_number(20).await?;
    flow.get_prompts().await?;
    assert_eq!(chain.calls("guestbooks(address)"), 2);

    flow.set_block_number(10).await?;
    flow.get_prompts().await?;
    assert_eq!(chain.calls("guestbooks(address)"), 2);

    let stats = flow.cache_stats().await?;
    assert_eq!(stats.entries, 2);
    assert_eq!(stats.call_misses, 2);
    assert!(stats.call_hits >= 2);
    Ok(())
}

#[tokio::test]
async fn test_transactions_are_never_cached() -> anyhow::Result<()> {
    let chain = MockChain::new();
    let flow = load(GUESTBOOK, &chain);
    flow.init(ALICE, 10, Signer::new(ALICE)).await?;

    let create = action(&flow, "Create Guestbook").await?;
    assert!(flow.execute(&create).await?.succeeded);
    match flow.execute(&create).await {
        Err(FlowError::Hook(HookError::Reverted(reason))) => {
            assert_eq!(reason, "ALREADY_CREATED");
        }
        other => panic!("unexpected result {other:?}"),
    }
    assert_eq!(chain.calls("create()"), 2);
    Ok(())
}

const LOOKUP: &str = r#"
address(guestbook, '{{contractAddr}}').
abi(guestbook, [ guestbooks(address): uint / view ]).

prompt :-
  get(me/address, Me),
  call_fn(guestbook, guestbooks(Me), [Id]),
  show [ text(book, Id) ].
prompt :-
  show [
    button('Lookup', [
      get(me/address, Me),
      call_fn(guestbook, guestbooks(Me), [Id]),
      set(found, Id)
    ])
  ].
"#;

#[tokio::test]
async fn test_action_view_calls_share_the_block_cache() -> anyhow::Result<()> {
    let chain = MockChain::new();
    chain.create_for(ALICE);
    let flow = load(LOOKUP, &chain);
    flow.init(ALICE, 5, Signer::new(ALICE)).await?;
    assert_eq!(chain.calls("guestbooks(address)"), 1);

    let lookup = action(&flow, "Lookup").await?;
    assert!(flow.execute(&lookup).await?.succeeded);
    assert!(flow.execute(&lookup).await?.succeeded);
    assert_eq!(chain.calls("guestbooks(address)"), 1);
    assert_eq!(flow.prompt_count("text(book, 1)").await?, 1);
    assert_eq!(chain.calls("guestbooks(address)"), 1);

    flow.set_block_number(6).await?;
    assert!(flow.execute(&lookup).await?.succeeded);
    assert_eq!(chain.calls("guestbooks(address)"), 2);
    assert!(flow.execute(&lookup).await?.succeeded);
    assert_eq!(chain.calls("guestbooks(address)"), 2);

    let stats = flow.cache_stats().await?;
    assert_eq!(stats.call_misses, 2);
    assert!(stats.call_hits >= 4);
    Ok(())
}

const ENTRIES: &str = r#"
address(guestbook, '{{contractAddr}}').
abi(guestbook, [ entries(uint256, uint256): tuple(address, uint256, string) / view ]).

prompt :-
  call_fn(guestbook, entries(1, 0), [E]),
  show [ debug(E) ].
prompt :- show [ text(ready) ].
"#;

#[tokio::test]
async fn test_failed_calls_are_not_cached() -> anyhow::Result<()> {
    let chain = MockChain::new();
    let flow = load(ENTRIES, &chain);
    let prompts = flow.init(ALICE, 10, Signer::new(ALICE)).await?;
    assert_eq!(prompts.len(), 1);

    flow.set_block_number(10).await?;
    flow.get_prompts().await?;
    assert_eq!(chain.calls("entries(uint256,uint256)"), 2);
    assert_eq!(flow.cache_stats().await?.entries, 0);
    Ok(())
}

const PRICES: &str = r#"
oracle(prices, read, 'api.example.org').

prompt :-
  get_http(prices, '/price', response(200, json(Fields))),
  member(eth-json(Quote), Fields),
  member(usd-Usd, Quote),
  show [ text(price, Usd) ].
prompt :-
  get_http(prices, '/price', response(Status, _)),
  show [ debug(again(Status)) ].
prompt :-
  get_http(prices, '/text', Response),
  show [ debug(Response) ].
prompt :- show [ button('Post', [ call_http(post, prices, '/price', _) ]) ].
"#;

#[tokio::test]
async fn test_http_bodies_are_cached() -> anyhow::Result<()> {
    let chain = MockChain::new();
    let flow = load(PRICES, &chain);
    flow.init(ALICE, 1, Signer::new(ALICE)).await?;

    assert_eq!(flow.prompt_count("text(price, 3100)").await?, 1);
    assert_eq!(flow.prompt_count("debug(again(200))").await?, 1);
    assert_eq!(flow.prompt_count("debug(response(200, null))").await?, 1);

    let calls = chain.http_calls();
    assert_eq!(
        calls.iter().filter(|url| url.as_str() == "https://api.example.org/price").count(),
        1
    );
    assert_eq!(
        calls.iter().filter(|url| url.as_str() == "https://api.example.org/text").count(),
        1
    );

    flow.set_block_number(1).await?;
    flow.get_prompts().await?;
    assert_eq!(chain.http_calls().len(), 3);
    Ok(())
}

#[tokio::test]
async fn test_only_get_requests_are_sent() -> anyhow::Result<()> {
    let chain = MockChain::new();
    let flow = load(PRICES, &chain);
    flow.init(ALICE, 1, Signer::new(ALICE)).await?;
    let before = chain.http_calls().len();

    let post = action(&flow, "Post").await?;
    match flow.execute(&post).await {
        Err(FlowError::HttpMethodNotSupported { method }) => assert_eq!(method, "POST"),
        other => panic!("unexpected result {other:?}"),
    }
    assert_eq!(chain.http_calls().len(), before);
    Ok(())
}
