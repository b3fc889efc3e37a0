//! The agenda: activations waiting to fire.
//!
//! Activations for rules without a duration go on the immediate queue and fire
//! when the caller asks ([`WorkingMemory::fire_all_rules`]). Activations with a
//! duration are tracked in `scheduled_items` and handed to the [`Scheduler`],
//! which fires them on its own thread.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use tracing::debug;

use crate::context::PropagationContext;
use crate::error::{lock_err, ReteError, ReteResult};
use crate::rule::Rule;
use crate::scheduler::Scheduler;
use crate::tuple::{Tuple, TupleKey};
use crate::working_memory::WorkingMemory;

mod activation;
mod resolver;

pub use activation::{Activation, ActivationId};
pub use resolver::{ConflictResolver, LoadOrderConflictResolver};

#[derive(Default)]
struct AgendaState {
    queue: Vec<Arc<Activation>>,
    scheduled_items: HashMap<ActivationId, Arc<Activation>>,
}

/// Per-working-memory activation store.
pub struct Agenda {
    memory: Weak<WorkingMemory>,
    scheduler: Arc<Scheduler>,
    resolver: Arc<dyn ConflictResolver>,
    state: Mutex<AgendaState>,
}

impl Agenda {
    pub(crate) fn new(
        memory: Weak<WorkingMemory>,
        scheduler: Arc<Scheduler>,
        resolver: Arc<dyn ConflictResolver>,
    ) -> Self {
        Self {
            memory,
            scheduler,
            resolver,
            state: Mutex::new(AgendaState::default()),
        }
    }

    #[must_use]
    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// Creates an activation for `rule` on `tuple`.
    ///
    /// A no-loop rule ignores matches caused by its own consequence.
    pub fn add_to_agenda(
        &self,
        tuple: Tuple,
        context: PropagationContext,
        rule: Arc<Rule>,
    ) -> ReteResult<()> {
        if rule.is_no_loop() && context.originates_from(&rule) {
            debug!(
                rule = rule.name(),
                key = %tuple.key(),
                "no-loop rule suppressed its own activation"
            );
            return Ok(());
        }

        let delay = rule.duration_for(&tuple);
        let activation = Arc::new(Activation::new(tuple, context, rule));

        let Some(delay) = delay else {
            debug!(rule = activation.rule().name(), id = %activation.id(), "activation queued");
            self.state
                .lock()
                .map_err(|_| lock_err("agenda"))?
                .queue
                .push(activation);
            return Ok(());
        };

        let memory = self
            .memory
            .upgrade()
            .ok_or_else(|| ReteError::internal("working memory dropped while scheduling"))?;

        self.state
            .lock()
            .map_err(|_| lock_err("agenda"))?
            .scheduled_items
            .insert(activation.id(), Arc::clone(&activation));

        debug!(
            rule = activation.rule().name(),
            id = %activation.id(),
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "activation scheduled"
        );
        if let Err(err) = self.scheduler.schedule_agenda_item(Arc::clone(&activation), &memory) {
            self.state
                .lock()
                .map_err(|_| lock_err("agenda"))?
                .scheduled_items
                .remove(&activation.id());
            return Err(err.into());
        }
        Ok(())
    }

    /// Activations waiting on the scheduler.
    pub fn scheduled_items(&self) -> ReteResult<Vec<Arc<Activation>>> {
        let state = self.state.lock().map_err(|_| lock_err("agenda"))?;
        let mut items: Vec<_> = state.scheduled_items.values().cloned().collect();
        items.sort_by_key(|a| a.created_at());
        Ok(items)
    }

    /// Immediate activations in insertion order.
    pub fn activations(&self) -> ReteResult<Vec<Arc<Activation>>> {
        Ok(self
            .state
            .lock()
            .map_err(|_| lock_err("agenda"))?
            .queue
            .clone())
    }

    /// Number of immediate activations.
    pub fn size(&self) -> ReteResult<usize> {
        Ok(self.state.lock().map_err(|_| lock_err("agenda"))?.queue.len())
    }

    pub fn is_empty(&self) -> ReteResult<bool> {
        Ok(self.size()? == 0)
    }

    /// Removes and returns the immediate activation that fires next.
    pub fn next_activation(&self) -> ReteResult<Option<Arc<Activation>>> {
        let mut state = self.state.lock().map_err(|_| lock_err("agenda"))?;
        let mut best: Option<usize> = None;
        for (idx, candidate) in state.queue.iter().enumerate() {
            match best {
                Some(b) if !self.resolver.compare(candidate, &state.queue[b]).is_lt() => {}
                _ => best = Some(idx),
            }
        }
        Ok(best.map(|idx| state.queue.remove(idx)))
    }

    /// Runs the activation's consequence on the calling thread.
    pub fn fire_activation(
        &self,
        activation: &Activation,
        memory: &WorkingMemory,
    ) -> ReteResult<()> {
        debug!(rule = activation.rule().name(), id = %activation.id(), "firing activation");
        let _firing = memory.enter_consequence(activation)?;
        (activation.rule().consequence())(activation, memory)?;
        Ok(())
    }

    /// Fires a scheduled activation unless it was cancelled.
    ///
    /// Returns whether the consequence ran.
    pub fn fire_scheduled(
        &self,
        activation: &Activation,
        memory: &WorkingMemory,
    ) -> ReteResult<bool> {
        self.state
            .lock()
            .map_err(|_| lock_err("agenda"))?
            .scheduled_items
            .remove(&activation.id());

        if activation.is_cancelled() {
            debug!(
                rule = activation.rule().name(),
                id = %activation.id(),
                "skipping cancelled activation"
            );
            return Ok(false);
        }

        self.fire_activation(activation, memory)?;
        Ok(true)
    }

    /// Drops queued and cancels scheduled activations addressed by `key`,
    /// optionally only those of the named rule. Returns how many were affected.
    pub fn cancel_activations(&self, rule: Option<&str>, key: &TupleKey) -> ReteResult<usize> {
        let addressed = |a: &Activation| {
            a.tuple().matches_key(key) && rule.map_or(true, |name| a.rule().name() == name)
        };

        let mut state = self.state.lock().map_err(|_| lock_err("agenda"))?;
        let before = state.queue.len();
        state.queue.retain(|a| !addressed(a));
        let mut count = before - state.queue.len();

        state.scheduled_items.retain(|_, a| {
            if addressed(a) {
                a.cancel();
                count += 1;
                false
            } else {
                true
            }
        });
        Ok(count)
    }

    /// Drops every queued activation and cancels every scheduled one.
    pub fn clear(&self) -> ReteResult<()> {
        let mut state = self.state.lock().map_err(|_| lock_err("agenda"))?;
        state.queue.clear();
        for (_, activation) in state.scheduled_items.drain() {
            activation.cancel();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::context::PropagationKind;
    use crate::error::ConsequenceError;
    use crate::fact::FactHandle;
    use crate::rule::FixedDuration;
    use crate::testing::test_memory;

    fn assertion() -> PropagationContext {
        PropagationContext::external(PropagationKind::Assertion)
    }

    fn tuple(id: u64) -> Tuple {
        Tuple::new(0, FactHandle::new(id))
    }

    #[test]
    fn test_unbounded_duration_stays_scheduled() {
        let wm = test_memory();
        let rule = Arc::new(
            Rule::new("forever", |_, _| Ok(())).with_duration(FixedDuration::new(Duration::MAX)),
        );
        wm.agenda().add_to_agenda(tuple(1), assertion(), rule).unwrap();
        assert_eq!(wm.agenda().scheduled_items().unwrap().len(), 1);
        assert_eq!(wm.agenda().size().unwrap(), 0);
        assert_eq!(wm.agenda().scheduler().pending(), 1);
    }

    #[test]
    fn test_immediate_activation_is_queued() {
        let wm = test_memory();
        let rule = Arc::new(Rule::new("test-rule", |_, _| Ok(())));
        wm.agenda().add_to_agenda(tuple(1), assertion(), rule).unwrap();
        assert_eq!(wm.agenda().size().unwrap(), 1);
        assert!(wm.agenda().scheduled_items().unwrap().is_empty());
    }

    #[test]
    fn test_timed_activation_is_scheduled() {
        let wm = test_memory();
        let rule = Arc::new(
            Rule::new("timed", |_, _| Ok(()))
                .with_duration(FixedDuration::new(Duration::from_secs(60))),
        );
        wm.agenda().add_to_agenda(tuple(1), assertion(), rule).unwrap();
        assert_eq!(wm.agenda().size().unwrap(), 0);
        assert_eq!(wm.agenda().scheduled_items().unwrap().len(), 1);
        assert_eq!(wm.agenda().scheduler().pending(), 1);
    }

    #[test]
    fn test_no_loop_drops_self_caused_activation() {
        let wm = test_memory();
        let rule = Arc::new(Rule::new("looping", |_, _| Ok(())).with_no_loop(true));
        let own =
            PropagationContext::new(PropagationKind::Assertion, Some(Arc::clone(&rule)), None);
        wm.agenda().add_to_agenda(tuple(1), own, Arc::clone(&rule)).unwrap();
        assert_eq!(wm.agenda().size().unwrap(), 0);

        // A different origin still activates.
        wm.agenda().add_to_agenda(tuple(1), assertion(), rule).unwrap();
        assert_eq!(wm.agenda().size().unwrap(), 1);
    }

    #[test]
    fn test_next_activation_uses_load_order_then_insertion() {
        let wm = test_memory();
        let late = Arc::new(Rule::new("late", |_, _| Ok(())).with_load_order(2));
        let early = Arc::new(Rule::new("early", |_, _| Ok(())).with_load_order(1));
        let agenda = wm.agenda();
        agenda.add_to_agenda(tuple(1), assertion(), Arc::clone(&late)).unwrap();
        agenda.add_to_agenda(tuple(2), assertion(), Arc::clone(&early)).unwrap();
        agenda.add_to_agenda(tuple(3), assertion(), Arc::clone(&early)).unwrap();

        let order: Vec<_> = std::iter::from_fn(|| agenda.next_activation().unwrap())
            .map(|a| (a.rule().name().to_string(), a.tuple().get(0)))
            .collect();
        assert_eq!(
            order,
            vec![
                ("early".to_string(), Some(FactHandle::new(2))),
                ("early".to_string(), Some(FactHandle::new(3))),
                ("late".to_string(), Some(FactHandle::new(1))),
            ]
        );
    }

    #[test]
    fn test_fire_activation_reports_consequence_error() {
        let wm = test_memory();
        let rule = Arc::new(Rule::new("failing", |activation, _| {
            Err(ConsequenceError::new(activation.rule().name(), "test"))
        }));
        wm.agenda().add_to_agenda(tuple(1), assertion(), rule).unwrap();
        let activation = wm.agenda().next_activation().unwrap().unwrap();
        let err = wm.agenda().fire_activation(&activation, &wm).unwrap_err();
        assert!(err.is_consequence());
    }

    #[test]
    fn test_fire_scheduled_skips_cancelled() {
        let wm = test_memory();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let rule = Arc::new(
            Rule::new("timed", move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .with_duration(FixedDuration::new(Duration::from_secs(60))),
        );
        wm.agenda().add_to_agenda(tuple(1), assertion(), rule).unwrap();
        let item = wm.agenda().scheduled_items().unwrap().remove(0);

        assert_eq!(
            wm.agenda()
                .cancel_activations(None, &TupleKey::new(0, FactHandle::new(1)))
                .unwrap(),
            1
        );
        assert!(item.is_cancelled());
        assert!(!wm.agenda().fire_scheduled(&item, &wm).unwrap());
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_fire_scheduled_removes_item() {
        let wm = test_memory();
        let rule = Arc::new(
            Rule::new("timed", |_, _| Ok(()))
                .with_duration(FixedDuration::new(Duration::from_secs(60))),
        );
        wm.agenda().add_to_agenda(tuple(1), assertion(), rule).unwrap();
        let item = wm.agenda().scheduled_items().unwrap().remove(0);
        assert!(wm.agenda().fire_scheduled(&item, &wm).unwrap());
        assert!(wm.agenda().scheduled_items().unwrap().is_empty());
    }

    #[test]
    fn test_cancel_filters_by_rule() {
        let wm = test_memory();
        let a = Arc::new(Rule::new("a", |_, _| Ok(())));
        let b = Arc::new(Rule::new("b", |_, _| Ok(())));
        wm.agenda().add_to_agenda(tuple(1), assertion(), a).unwrap();
        wm.agenda().add_to_agenda(tuple(1), assertion(), b).unwrap();

        let key = TupleKey::new(0, FactHandle::new(1));
        assert_eq!(wm.agenda().cancel_activations(Some("a"), &key).unwrap(), 1);
        let left = wm.agenda().activations().unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].rule().name(), "b");
    }

    #[test]
    fn test_clear() {
        let wm = test_memory();
        let timed = Arc::new(
            Rule::new("timed", |_, _| Ok(()))
                .with_duration(FixedDuration::new(Duration::from_secs(60))),
        );
        let immediate = Arc::new(Rule::new("immediate", |_, _| Ok(())));
        wm.agenda().add_to_agenda(tuple(1), assertion(), Arc::clone(&timed)).unwrap();
        wm.agenda().add_to_agenda(tuple(2), assertion(), immediate).unwrap();
        let item = wm.agenda().scheduled_items().unwrap().remove(0);

        wm.agenda().clear().unwrap();
        assert!(wm.agenda().is_empty().unwrap());
        assert!(wm.agenda().scheduled_items().unwrap().is_empty());
        assert!(item.is_cancelled());
    }
}
