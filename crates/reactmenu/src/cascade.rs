//! Cascade: echo a parent's transition into the child surfaces it spawned.
//!
//! A parent menu may point at a child surface through `child_message_id`.
//! When the parent transitions, its pane declaration decides (per clicked
//! emoji) whether the child should replay a synthetic click, and with which
//! extra state. The walk continues down the chain until a link is missing, a
//! step declines, or [`CASCADE_FAILSAFE`] hops have been taken. Hitting the
//! failsafe is not an error; cyclic chains simply stop there.

use tracing::{debug, warn};

use crate::dispatch::Dispatcher;
use crate::error::TransportError;
use crate::state::{MenuState, UserId};
use crate::surface::Surface;

/// Maximum number of child links followed for one reaction.
pub const CASCADE_FAILSAFE: usize = 10;

/// What a cascade did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CascadeReport {
    /// Links visited, including the one that ended the walk.
    pub hops: usize,
    /// Child surfaces actually edited.
    pub edits: usize,
}

impl Dispatcher {
    /// Propagate `emoji` down the child chain starting at `parent`, whose
    /// state before the transition was `parent_state`.
    pub(crate) async fn cascade(
        &self,
        parent_state: &MenuState,
        parent: &Surface,
        emoji: &str,
        actor: UserId,
    ) -> CascadeReport {
        let mut report = CascadeReport::default();
        let mut current = parent_state.clone();
        let mut channel = parent.channel_id;

        while let Some(child_id) = current.child_message_id {
            if report.hops == CASCADE_FAILSAFE {
                debug!(hops = report.hops, "cascade failsafe reached");
                break;
            }
            report.hops += 1;

            let entry = match self.registry.resolve(&current) {
                Ok(entry) => entry,
                Err(error) => {
                    self.absorb(error);
                    break;
                }
            };
            let Some(child_transition) = entry.panes.child_transition(emoji) else {
                break;
            };
            let data = match self.default_data(&entry, &current, emoji).await {
                Ok(data) => data,
                Err(error) => {
                    self.absorb(error);
                    break;
                }
            };
            let step = match child_transition.child_step(&current, emoji, &data).await {
                Ok(step) => step,
                Err(error) => {
                    warn!(owner = %entry.owner_id, error = %format!("{error:#}"), "child transition failed");
                    break;
                }
            };
            let Some(simulated) = step.emoji else {
                break;
            };

            let child = match self.transport.fetch_surface(channel, child_id).await {
                Ok(child) => child,
                Err(TransportError::NotFound) => {
                    debug!(child = %child_id, "child surface gone; cascade ends");
                    break;
                }
                Err(error) => {
                    warn!(child = %child_id, %error, "failed to fetch child surface");
                    break;
                }
            };
            let Some(mut child_state) = self.codec.extract(&child.content) else {
                debug!(child = %child_id, "child surface carries no menu state");
                break;
            };
            if let Err(error) = child_state.merge(step.extra) {
                debug!(child = %child_id, %error, "child step produced invalid state");
                break;
            }
            let child_entry = match self.registry.resolve(&child_state) {
                Ok(entry) => entry,
                Err(error) => {
                    self.absorb(error);
                    break;
                }
            };

            match self
                .commit_transition(&child_entry, &child, child_state.clone(), &simulated, actor, &data)
                .await
            {
                Ok(edited) => report.edits += usize::from(edited),
                Err(reason) => {
                    debug!(child = %child_id, ?reason, "cascade stopped");
                    break;
                }
            }

            current = child_state;
            channel = child.channel_id;
        }
        report
    }
}
