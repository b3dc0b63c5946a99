//! Scripted task progressions for MockPrismClient

use super::{MockPrismClient, Reservation, lock};
use crate::error::PrismError;
use crate::models::*;
use chrono::Utc;
use serde_json::json;
use std::net::IpAddr;

/// How a scripted task ends
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedOutcome {
    Succeed,
    Fail(String),
    Cancel,
}

/// Behaviour of one submitted task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskScript {
    /// Polls answered with `RUNNING` before the outcome is reported
    pub pending_polls: u32,
    pub outcome: ScriptedOutcome,
}

impl TaskScript {
    /// Succeed after `pending_polls` running polls
    pub fn succeed_after(pending_polls: u32) -> Self {
        Self {
            pending_polls,
            outcome: ScriptedOutcome::Succeed,
        }
    }

    /// Fail with `message` after `pending_polls` running polls
    pub fn fail_after(pending_polls: u32, message: impl Into<String>) -> Self {
        Self {
            pending_polls,
            outcome: ScriptedOutcome::Fail(message.into()),
        }
    }

    /// Cancel after `pending_polls` running polls
    pub fn cancel_after(pending_polls: u32) -> Self {
        Self {
            pending_polls,
            outcome: ScriptedOutcome::Cancel,
        }
    }
}

impl Default for TaskScript {
    fn default() -> Self {
        Self::succeed_after(0)
    }
}

/// Side effect applied when a task succeeds
#[derive(Debug, Clone)]
pub(crate) enum Effect {
    /// Addresses already held at submission; reported in completion details
    Reserved(Vec<IpAddr>),
    /// Addresses returned to the free list on success
    Unreserve {
        subnet: String,
        spec: IpUnreserveSpec,
    },
}

#[derive(Debug)]
pub(crate) struct MockTask {
    pub(crate) task: Task,
    remaining: u32,
    outcome: ScriptedOutcome,
    effect: Option<Effect>,
}

pub(crate) fn next_script(mock: &MockPrismClient) -> TaskScript {
    lock(&mock.scripts).pop_front().unwrap_or_default()
}

pub(crate) fn create_task(
    mock: &MockPrismClient,
    operation: &str,
    script: TaskScript,
    effect: Option<Effect>,
) -> TaskReference {
    let ext_id = format!("ZXJnb24=:task-{}", mock.next_id());
    let task = Task {
        ext_id: ext_id.clone(),
        status: Some(TaskStatus::Queued),
        operation: Some(operation.to_string()),
        progress_percentage: Some(0),
        created_time: Some(Utc::now()),
        completed_time: None,
        completion_details: Vec::new(),
        error_messages: Vec::new(),
    };
    lock(&mock.tasks).insert(
        ext_id.clone(),
        MockTask {
            task,
            remaining: script.pending_polls,
            outcome: script.outcome,
            effect,
        },
    );
    TaskReference { ext_id }
}

pub(crate) fn poll_task(mock: &MockPrismClient, ext_id: &str) -> Result<Task, PrismError> {
    let (snapshot, effect) = {
        let mut tasks = lock(&mock.tasks);
        let entry = tasks
            .get_mut(ext_id)
            .ok_or_else(|| PrismError::NotFound(format!("Task {} not found", ext_id)))?;

        let mut effect = None;
        let terminal = entry.task.status.is_some_and(TaskStatus::is_terminal);
        if !terminal {
            if entry.remaining > 0 {
                entry.remaining -= 1;
                entry.task.status = Some(TaskStatus::Running);
                entry.task.progress_percentage = Some(50);
            } else {
                match &entry.outcome {
                    ScriptedOutcome::Succeed => {
                        entry.task.status = Some(TaskStatus::Succeeded);
                        effect = entry.effect.take();
                        if let Some(Effect::Reserved(ips)) = &effect {
                            let ips: Vec<String> = ips.iter().map(ToString::to_string).collect();
                            entry.task.completion_details = vec![KvPair {
                                name: "reservedIps".to_string(),
                                value: serde_json::Value::String(
                                    json!({ "reserved_ips": ips }).to_string(),
                                ),
                            }];
                        }
                    }
                    ScriptedOutcome::Fail(message) => {
                        entry.task.status = Some(TaskStatus::Failed);
                        entry.task.error_messages = vec![AppMessage {
                            message: Some(message.clone()),
                            code: Some("NET-40003".to_string()),
                            severity: Some("ERROR".to_string()),
                        }];
                    }
                    ScriptedOutcome::Cancel => {
                        entry.task.status = Some(TaskStatus::Canceled);
                    }
                }
                entry.task.progress_percentage = Some(100);
                entry.task.completed_time = Some(Utc::now());
            }
        }
        (entry.task.clone(), effect)
    };

    if let Some(Effect::Unreserve { subnet, spec }) = effect {
        apply_unreserve(mock, &subnet, &spec);
    }

    Ok(snapshot)
}

fn apply_unreserve(mock: &MockPrismClient, subnet: &str, spec: &IpUnreserveSpec) {
    let mut free = lock(&mock.free_ips);
    let mut reserved = lock(&mock.reserved);
    let held = reserved.entry(subnet.to_string()).or_default();

    let released: Vec<Reservation> = match spec.unreserve_type {
        UnreserveType::Context => {
            let ctx = spec.client_context.as_deref();
            drain_where(held, |r| ctx.is_some() && r.client_context.as_deref() == ctx)
        }
        UnreserveType::IpAddressList => {
            let wanted: Vec<IpAddr> = spec
                .ip_addresses
                .iter()
                .filter_map(IpAddress::to_ip_addr)
                .collect();
            drain_where(held, |r| wanted.contains(&r.ip))
        }
        UnreserveType::IpAddressRange => {
            let wanted = super::networking::range_addresses(spec.start_ip_address.as_ref(), spec.count)
                .unwrap_or_default();
            drain_where(held, |r| wanted.contains(&r.ip))
        }
    };

    let pool = free.entry(subnet.to_string()).or_default();
    pool.extend(released.into_iter().map(|r| r.ip));
    pool.sort();
    pool.dedup();
}

fn drain_where(held: &mut Vec<Reservation>, pred: impl Fn(&Reservation) -> bool) -> Vec<Reservation> {
    let (out, keep): (Vec<_>, Vec<_>) = held.drain(..).partition(|r| pred(r));
    *held = keep;
    out
}
