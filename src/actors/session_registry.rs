//! Session registry actor.
//!
//! One actor owns every interactive lookup session, keyed by conversation.
//! All session state lives in the actor's state and every transition runs
//! through its mailbox, so candidate lists, timeouts, and replies never
//! race. Blocking work (searches, resolution, the selection timeout) runs
//! in spawned tasks that cast their outcome back; each task handle is kept
//! so a superseding search can abort it.
//!
//! Stale completions are fenced by an epoch: every new search in a
//! conversation bumps the epoch, and task-originated messages carrying an
//! older epoch are dropped.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::dispatch::{MessageGateway, ResultAggregator};
use crate::providers::{ProviderError, StandaloneCatalog};
use crate::resolver::ResourceResolver;
use crate::types::Candidate;

#[derive(Debug, Default)]
pub struct SessionRegistry;

/// Shared collaborators handed to every session.
pub struct SessionRegistryArgs {
    pub catalog: Arc<dyn StandaloneCatalog>,
    pub resolver: Arc<ResourceResolver>,
    pub gateway: Arc<dyn MessageGateway>,
    pub aggregator: Arc<ResultAggregator>,
    pub selection_timeout: Duration,
    pub max_candidates: usize,
}

pub enum SessionRegistryMsg {
    /// A user asked for a game lookup.
    SearchRequested {
        conversation_id: String,
        requester_id: String,
        query: String,
    },
    /// Any message seen in a conversation with a pending choice.
    ReplyReceived {
        conversation_id: String,
        sender_id: String,
        text: String,
    },
    /// Search task completed (task-originated, epoch-fenced).
    SearchFinished {
        conversation_id: String,
        epoch: u64,
        outcome: Result<Vec<Candidate>, ProviderError>,
    },
    /// Selection window elapsed (task-originated, epoch-fenced).
    TimeoutFired { conversation_id: String, epoch: u64 },
    /// Resolution and dispatch completed (task-originated, epoch-fenced).
    ResolutionFinished { conversation_id: String, epoch: u64 },
    /// Test/diagnostic peek at a session's current phase.
    Inspect {
        conversation_id: String,
        reply: RpcReplyPort<Option<SessionSnapshot>>,
    },
}

/// Observable session phase, for diagnostics and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionSnapshot {
    Searching { epoch: u64, query: String },
    AwaitingChoice { epoch: u64, titles: Vec<String> },
    Resolving { epoch: u64 },
}

enum Phase {
    Searching {
        query: String,
        task: JoinHandle<()>,
    },
    AwaitingChoice {
        requester_id: String,
        candidates: Vec<Candidate>,
        timeout: JoinHandle<()>,
    },
    Resolving {
        task: JoinHandle<()>,
    },
}

struct Session {
    epoch: u64,
    requester_id: String,
    phase: Phase,
}

impl Session {
    fn abort_tasks(&self) {
        match &self.phase {
            Phase::Searching { task, .. } => task.abort(),
            Phase::AwaitingChoice { timeout, .. } => timeout.abort(),
            Phase::Resolving { task } => task.abort(),
        }
    }
}

pub struct SessionRegistryState {
    args: SessionRegistryArgs,
    sessions: HashMap<String, Session>,
    next_epoch: u64,
}

impl SessionRegistryState {
    /// Drop a session and abort whatever it had in flight.
    fn evict(&mut self, conversation_id: &str) {
        if let Some(session) = self.sessions.remove(conversation_id) {
            session.abort_tasks();
        }
    }

    /// A task-originated message is live only if its epoch matches the
    /// session currently registered for the conversation.
    fn live_epoch(&self, conversation_id: &str, epoch: u64) -> bool {
        self.sessions
            .get(conversation_id)
            .is_some_and(|session| session.epoch == epoch)
    }
}

fn spawn_search(
    myself: &ActorRef<SessionRegistryMsg>,
    catalog: Arc<dyn StandaloneCatalog>,
    conversation_id: String,
    query: String,
    epoch: u64,
) -> JoinHandle<()> {
    let myself = myself.clone();
    tokio::spawn(async move {
        let outcome = catalog.search(&query).await;
        let _ = myself.cast(SessionRegistryMsg::SearchFinished {
            conversation_id,
            epoch,
            outcome,
        });
    })
}

fn spawn_timeout(
    myself: &ActorRef<SessionRegistryMsg>,
    conversation_id: String,
    epoch: u64,
    after: Duration,
) -> JoinHandle<()> {
    let myself = myself.clone();
    tokio::spawn(async move {
        tokio::time::sleep(after).await;
        let _ = myself.cast(SessionRegistryMsg::TimeoutFired {
            conversation_id,
            epoch,
        });
    })
}

fn spawn_resolution(
    myself: &ActorRef<SessionRegistryMsg>,
    state: &SessionRegistryState,
    conversation_id: String,
    requester_id: String,
    candidate: Candidate,
    epoch: u64,
) -> JoinHandle<()> {
    let myself = myself.clone();
    let resolver = state.args.resolver.clone();
    let gateway = state.args.gateway.clone();
    let aggregator = state.args.aggregator.clone();
    tokio::spawn(async move {
        let bundle = resolver.resolve(&candidate).await;
        if bundle.is_empty() {
            let _ = gateway
                .notify(
                    &conversation_id,
                    &format!("No resources found for \"{}\"", bundle.keyword),
                )
                .await;
        } else {
            let (nodes, meta) = aggregator.build(&bundle, &requester_id);
            if let Err(e) = gateway.dispatch(&conversation_id, nodes, meta).await {
                warn!(conversation_id, error = %e, "Bundle dispatch failed");
            }
        }
        let _ = myself.cast(SessionRegistryMsg::ResolutionFinished {
            conversation_id,
            epoch,
        });
    })
}

fn choice_prompt(candidates: &[Candidate], timeout: Duration) -> String {
    let mut lines = vec![format!(
        "Found {} possible matches, reply with a number within {}s (0 to cancel):",
        candidates.len(),
        timeout.as_secs()
    )];
    for (index, candidate) in candidates.iter().enumerate() {
        lines.push(format!("{}. {}", index + 1, candidate.raw_title));
    }
    lines.join("\n")
}

#[ractor::async_trait]
impl Actor for SessionRegistry {
    type Msg = SessionRegistryMsg;
    type State = SessionRegistryState;
    type Arguments = SessionRegistryArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        info!(registry = %myself.get_id(), "SessionRegistry starting");
        Ok(SessionRegistryState {
            args,
            sessions: HashMap::new(),
            next_epoch: 0,
        })
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        for session in state.sessions.values() {
            session.abort_tasks();
        }
        state.sessions.clear();
        Ok(())
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SessionRegistryMsg::SearchRequested {
                conversation_id,
                requester_id,
                query,
            } => {
                // An empty query never opens a session and never touches an
                // existing one.
                if query.trim().is_empty() {
                    let _ = state
                        .args
                        .gateway
                        .notify(&conversation_id, "Usage: search <game name>")
                        .await;
                    return Ok(());
                }

                // A new search supersedes anything in flight for the
                // conversation. The old session's tasks are aborted and its
                // epoch retired; no further output escapes from it.
                if state.sessions.contains_key(&conversation_id) {
                    info!(conversation_id, "Superseding in-flight session");
                    state.evict(&conversation_id);
                }

                state.next_epoch += 1;
                let epoch = state.next_epoch;
                info!(conversation_id, requester_id, query, epoch, "Search requested");

                let task = spawn_search(
                    &myself,
                    state.args.catalog.clone(),
                    conversation_id.clone(),
                    query.clone(),
                    epoch,
                );
                state.sessions.insert(
                    conversation_id,
                    Session {
                        epoch,
                        requester_id,
                        phase: Phase::Searching { query, task },
                    },
                );
            }

            SessionRegistryMsg::SearchFinished {
                conversation_id,
                epoch,
                outcome,
            } => {
                if !state.live_epoch(&conversation_id, epoch) {
                    debug!(conversation_id, epoch, "Dropping stale search result");
                    return Ok(());
                }
                let candidates = match outcome {
                    Ok(candidates) => candidates,
                    Err(e) => {
                        warn!(conversation_id, error = %e, "Catalog search exhausted");
                        state.evict(&conversation_id);
                        let _ = state
                            .args
                            .gateway
                            .notify(&conversation_id, "Search failed, try again later")
                            .await;
                        return Ok(());
                    }
                };

                let mut candidates = candidates;
                candidates.truncate(state.args.max_candidates);

                match candidates.len() {
                    0 => {
                        info!(conversation_id, "No candidates found");
                        state.evict(&conversation_id);
                        let _ = state
                            .args
                            .gateway
                            .notify(&conversation_id, "No matching games found")
                            .await;
                    }
                    1 => {
                        // Unambiguous hit: skip the choice round-trip.
                        let Some(session) = state.sessions.get(&conversation_id) else {
                            return Ok(());
                        };
                        let requester_id = session.requester_id.clone();
                        let Some(candidate) = candidates.into_iter().next() else {
                            return Ok(());
                        };
                        info!(conversation_id, title = %candidate.raw_title, "Single candidate, resolving directly");
                        let task = spawn_resolution(
                            &myself,
                            state,
                            conversation_id.clone(),
                            requester_id,
                            candidate,
                            epoch,
                        );
                        if let Some(session) = state.sessions.get_mut(&conversation_id) {
                            session.phase = Phase::Resolving { task };
                        }
                    }
                    n => {
                        info!(conversation_id, count = n, "Prompting for disambiguation");
                        let prompt =
                            choice_prompt(&candidates, state.args.selection_timeout);
                        let _ = state.args.gateway.notify(&conversation_id, &prompt).await;
                        let timeout = spawn_timeout(
                            &myself,
                            conversation_id.clone(),
                            epoch,
                            state.args.selection_timeout,
                        );
                        if let Some(session) = state.sessions.get_mut(&conversation_id) {
                            let requester_id = session.requester_id.clone();
                            session.phase = Phase::AwaitingChoice {
                                requester_id,
                                candidates,
                                timeout,
                            };
                        } else {
                            timeout.abort();
                        }
                    }
                }
            }

            SessionRegistryMsg::ReplyReceived {
                conversation_id,
                sender_id,
                text,
            } => {
                let Some(session) = state.sessions.get(&conversation_id) else {
                    return Ok(());
                };
                let epoch = session.epoch;
                let Phase::AwaitingChoice {
                    requester_id,
                    candidates,
                    ..
                } = &session.phase
                else {
                    return Ok(());
                };
                // Only the user who started the session may answer.
                if sender_id != *requester_id {
                    debug!(conversation_id, sender_id, "Ignoring non-requester reply");
                    return Ok(());
                }

                let reply = text.trim();
                if reply == "0" {
                    info!(conversation_id, "Selection cancelled");
                    state.evict(&conversation_id);
                    let _ = state
                        .args
                        .gateway
                        .notify(&conversation_id, "Lookup cancelled")
                        .await;
                    return Ok(());
                }

                let chosen = reply
                    .parse::<usize>()
                    .ok()
                    .filter(|n| (1..=candidates.len()).contains(n))
                    .map(|n| candidates[n - 1].clone());

                let Some(candidate) = chosen else {
                    // Any non-numeric or out-of-range reply ends the session.
                    info!(conversation_id, reply, "Invalid selection, ending session");
                    state.evict(&conversation_id);
                    let _ = state
                        .args
                        .gateway
                        .notify(&conversation_id, "Invalid selection, lookup ended")
                        .await;
                    return Ok(());
                };

                info!(conversation_id, title = %candidate.raw_title, "Candidate selected");
                let requester_id = requester_id.clone();
                // Replace the timeout with the resolution task.
                if let Some(session) = state.sessions.get(&conversation_id) {
                    if let Phase::AwaitingChoice { timeout, .. } = &session.phase {
                        timeout.abort();
                    }
                }
                let task = spawn_resolution(
                    &myself,
                    state,
                    conversation_id.clone(),
                    requester_id,
                    candidate,
                    epoch,
                );
                if let Some(session) = state.sessions.get_mut(&conversation_id) {
                    session.phase = Phase::Resolving { task };
                }
            }

            SessionRegistryMsg::TimeoutFired {
                conversation_id,
                epoch,
            } => {
                if !state.live_epoch(&conversation_id, epoch) {
                    return Ok(());
                }
                // The timeout only terminates a pending choice; a selection
                // that arrived in the same mailbox drain already moved the
                // session to Resolving.
                let is_awaiting = matches!(
                    state.sessions.get(&conversation_id).map(|s| &s.phase),
                    Some(Phase::AwaitingChoice { .. })
                );
                if !is_awaiting {
                    return Ok(());
                }
                info!(conversation_id, "Selection window elapsed");
                state.evict(&conversation_id);
                let _ = state
                    .args
                    .gateway
                    .notify(&conversation_id, "Selection timed out, lookup ended")
                    .await;
            }

            SessionRegistryMsg::ResolutionFinished {
                conversation_id,
                epoch,
            } => {
                if !state.live_epoch(&conversation_id, epoch) {
                    return Ok(());
                }
                debug!(conversation_id, "Session complete");
                state.sessions.remove(&conversation_id);
            }

            SessionRegistryMsg::Inspect {
                conversation_id,
                reply,
            } => {
                let snapshot = state.sessions.get(&conversation_id).map(|session| {
                    match &session.phase {
                        Phase::Searching { query, .. } => SessionSnapshot::Searching {
                            epoch: session.epoch,
                            query: query.clone(),
                        },
                        Phase::AwaitingChoice { candidates, .. } => {
                            SessionSnapshot::AwaitingChoice {
                                epoch: session.epoch,
                                titles: candidates
                                    .iter()
                                    .map(|c| c.raw_title.clone())
                                    .collect(),
                            }
                        }
                        Phase::Resolving { .. } => SessionSnapshot::Resolving {
                            epoch: session.epoch,
                        },
                    }
                });
                let _ = reply.send(snapshot);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_numbers_candidates_from_one() {
        let candidates = vec![
            Candidate {
                raw_title: "泰拉瑞亚 | Terraria".to_string(),
                detail_url: "https://catalog.example/1".to_string(),
                thumbnail: None,
            },
            Candidate {
                raw_title: "泰拉瑞亚：灾厄 | Terraria Calamity".to_string(),
                detail_url: "https://catalog.example/2".to_string(),
                thumbnail: None,
            },
        ];
        let prompt = choice_prompt(&candidates, Duration::from_secs(40));
        assert!(prompt.starts_with("Found 2 possible matches"));
        assert!(prompt.contains("within 40s"));
        assert!(prompt.contains("1. 泰拉瑞亚 | Terraria"));
        assert!(prompt.contains("2. 泰拉瑞亚：灾厄 | Terraria Calamity"));
        assert!(prompt.contains("0 to cancel"));
    }
}
