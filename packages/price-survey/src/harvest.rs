//! Resumable trend harvest.
//!
//! The harvest walks three windows (90, 180 and 365 days) over the whole
//! entity list. A single invocation only handles `batch_size` entities, then
//! persists its cursor and arms a one-shot trigger for the next invocation.
//!
//! ```text
//!   resume() ──► cancel pending triggers
//!            ──► checkpoint for some phase? ── no ──► fresh start of 90d
//!            ──► process entities until budget or list end
//!                   budget hit  ──► save cursor, schedule trigger, Rescheduled
//!                   list end    ──► fresh start of next phase, then delete
//!                                   the finished cursor (or Finished after 365d)
//!            ──► any error     ──► schedule trigger, Retrying
//! ```
//!
//! The cursor is saved after every entity, so an invocation killed mid-batch
//! resumes right after the last entity it finished. A finished phase keeps its
//! cursor until the next phase's cursor is stored; a finished cursor found on
//! resume just rolls over again.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::pipeline::collect::SurveyContext;
use crate::pipeline::price::interest_series;
use crate::traits::sink::{EntitySource, SeriesSink};
use crate::traits::store::{CacheStore, PropertyStore};
use crate::traits::transport::Transport;
use crate::traits::trigger::TriggerScheduler;
use crate::types::harvest::{BatchCheckpoint, Phase, TrendRow, TrendSeries};
use crate::types::target::SearchTarget;

/// Handler name the harvest registers its triggers under.
pub const HARVEST_HANDLER: &str = "resume_trend_harvest";

/// Collaborators of the harvest.
#[derive(Clone, Copy)]
pub struct HarvestStores<'a> {
    pub entities: &'a dyn EntitySource,
    pub series: &'a dyn SeriesSink,
    pub properties: &'a dyn PropertyStore,
    pub triggers: &'a dyn TriggerScheduler,
}

impl<'a> HarvestStores<'a> {
    /// All roles served by one store.
    pub fn single<S>(store: &'a S) -> Self
    where
        S: EntitySource + SeriesSink + PropertyStore + TriggerScheduler,
    {
        Self {
            entities: store,
            series: store,
            properties: store,
            triggers: store,
        }
    }
}

/// What an invocation left behind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum InvocationOutcome {
    /// Work remains; a trigger is armed for `due_at`.
    Rescheduled {
        phase: Phase,
        next_row: usize,
        due_at: DateTime<Utc>,
    },
    /// The invocation failed; a trigger is armed to try again at `due_at`.
    Retrying {
        error: String,
        due_at: DateTime<Utc>,
    },
    /// Every phase is complete.
    Finished,
}

impl InvocationOutcome {
    pub fn is_finished(&self) -> bool {
        matches!(self, InvocationOutcome::Finished)
    }

    /// When the armed trigger fires, if one is armed.
    pub fn due_at(&self) -> Option<DateTime<Utc>> {
        match self {
            InvocationOutcome::Rescheduled { due_at, .. }
            | InvocationOutcome::Retrying { due_at, .. } => Some(*due_at),
            InvocationOutcome::Finished => None,
        }
    }
}

/// Drives the multi-phase harvest one bounded batch at a time.
pub struct TrendHarvester<'a, T, C> {
    ctx: &'a SurveyContext<T, C>,
    stores: HarvestStores<'a>,
}

impl<'a, T: Transport, C: CacheStore> TrendHarvester<'a, T, C> {
    pub fn new(ctx: &'a SurveyContext<T, C>, stores: HarvestStores<'a>) -> Self {
        Self { ctx, stores }
    }

    /// Run one invocation.
    ///
    /// Failures inside the batch never end the trigger chain: they are logged,
    /// a new trigger is armed and [`InvocationOutcome::Retrying`] is returned.
    /// Only a failure to cancel or arm triggers is returned as an error.
    pub async fn resume(&self, today: NaiveDate) -> Result<InvocationOutcome> {
        let cancelled = self.stores.triggers.cancel_all(HARVEST_HANDLER).await?;
        if cancelled > 0 {
            debug!(cancelled, "Cancelled pending harvest triggers");
        }

        match self.run_batch(today).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                let trigger = self
                    .stores
                    .triggers
                    .schedule_once(HARVEST_HANDLER, self.ctx.config.harvest.retrigger_delay())
                    .await?;
                error!(
                    error = %e,
                    due_at = %trigger.due_at,
                    "Harvest invocation failed, retry scheduled"
                );
                Ok(InvocationOutcome::Retrying {
                    error: e.to_string(),
                    due_at: trigger.due_at,
                })
            }
        }
    }

    async fn run_batch(&self, today: NaiveDate) -> Result<InvocationOutcome> {
        let targets = self.stores.entities.load_targets().await?;
        let config = &self.ctx.config.harvest;
        let mut budget = config.batch_size;

        let mut checkpoint = match self.current().await? {
            Some(checkpoint) => {
                info!(
                    phase = %checkpoint.phase,
                    next_row = checkpoint.next_row,
                    "Resuming trend harvest"
                );
                checkpoint
            }
            None => self.start_phase(Phase::first(), today).await?,
        };

        loop {
            let phase = checkpoint.phase;

            while budget > 0 && checkpoint.entity_index() < targets.len() {
                let target = &targets[checkpoint.entity_index()];
                let row = self.harvest_entity(target, phase, today).await;
                self.stores
                    .series
                    .write_row(&checkpoint.series, checkpoint.next_row, &row)
                    .await?;

                checkpoint.next_row += 1;
                self.save_checkpoint(&checkpoint).await?;
                budget -= 1;

                tokio::time::sleep(config.politeness_delay()).await;
            }

            if checkpoint.entity_index() < targets.len() {
                let trigger = self
                    .stores
                    .triggers
                    .schedule_once(HARVEST_HANDLER, config.retrigger_delay())
                    .await?;
                info!(
                    phase = %phase,
                    next_row = checkpoint.next_row,
                    remaining = targets.len() - checkpoint.entity_index(),
                    due_at = %trigger.due_at,
                    "Batch complete, harvest rescheduled"
                );
                return Ok(InvocationOutcome::Rescheduled {
                    phase,
                    next_row: checkpoint.next_row,
                    due_at: trigger.due_at,
                });
            }

            info!(phase = %phase, entities = targets.len(), "Harvest phase complete");

            let next = match phase.next() {
                Some(next) => Some(self.start_phase(next, today).await?),
                None => None,
            };
            self.stores.properties.delete_property(phase.label()).await?;

            match next {
                Some(fresh) => checkpoint = fresh,
                None => {
                    info!("Trend harvest finished");
                    return Ok(InvocationOutcome::Finished);
                }
            }
        }
    }

    /// Checkpoint of the earliest unfinished phase.
    pub async fn current(&self) -> Result<Option<BatchCheckpoint>> {
        for phase in Phase::ALL {
            if let Some(checkpoint) = self.load_checkpoint(phase).await? {
                return Ok(Some(checkpoint));
            }
        }
        Ok(None)
    }

    pub async fn load_checkpoint(&self, phase: Phase) -> Result<Option<BatchCheckpoint>> {
        match self.stores.properties.get_property(phase.label()).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Drop every checkpoint and pending trigger. The next `resume` starts over.
    pub async fn reset(&self) -> Result<()> {
        for phase in Phase::ALL {
            self.stores.properties.delete_property(phase.label()).await?;
        }
        let cancelled = self.stores.triggers.cancel_all(HARVEST_HANDLER).await?;
        info!(cancelled, "Trend harvest reset");
        Ok(())
    }

    async fn save_checkpoint(&self, checkpoint: &BatchCheckpoint) -> Result<()> {
        self.stores
            .properties
            .set_property(checkpoint.phase.label(), &serde_json::to_string(checkpoint)?)
            .await
    }

    /// Clear the phase's series, write its header and persist the first cursor.
    async fn start_phase(&self, phase: Phase, today: NaiveDate) -> Result<BatchCheckpoint> {
        let checkpoint = BatchCheckpoint::fresh(phase);
        self.stores.series.clear_series(&checkpoint.series).await?;
        self.stores
            .series
            .write_header(&checkpoint.series, &phase.header(today))
            .await?;
        self.save_checkpoint(&checkpoint).await?;

        info!(phase = %phase, series = %checkpoint.series, "Starting harvest phase");
        Ok(checkpoint)
    }

    /// The series row for one entity. Never fails: any problem becomes a
    /// "no data" row.
    async fn harvest_entity(&self, target: &SearchTarget, phase: Phase, today: NaiveDate) -> TrendRow {
        let no_data = || TrendRow::NoData {
            name: target.name.clone(),
            identifier: target.identifier.clone(),
        };

        let request = match self.ctx.builder.trends(target, phase, today) {
            Ok(request) => request,
            Err(e) => {
                warn!(entity = %target.name, error = %e, "Invalid trend request");
                return no_data();
            }
        };

        let payload = match self.ctx.fetcher.fetch(&request).await {
            Ok(outcome) => outcome.payload,
            Err(e) => {
                warn!(entity = %target.name, phase = %phase, error = %e, "Trend fetch failed");
                return no_data();
            }
        };

        let values = interest_series(&payload);
        if values.iter().all(Option::is_none) {
            debug!(entity = %target.name, phase = %phase, "Empty trend series");
            return no_data();
        }

        let keep = values.len().saturating_sub(phase.weeks());
        TrendRow::Series(TrendSeries {
            name: target.name.clone(),
            identifier: target.identifier.clone(),
            values: values[keep..].to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HarvestConfig, SurveyConfig};
    use crate::security::ApiKey;
    use crate::stores::MemoryStore;
    use crate::testing::{fixtures, MockTransport};
    use crate::traits::transport::HttpResponse;
    use std::sync::Arc;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 30).unwrap()
    }

    fn context(batch_size: usize) -> SurveyContext<Arc<MockTransport>, Arc<MemoryStore>> {
        let config = SurveyConfig::default().with_harvest(HarvestConfig {
            batch_size,
            politeness_delay_ms: 0,
            retrigger_delay_secs: 60,
        });
        let transport = Arc::new(MockTransport::new().with_default(HttpResponse::ok_json(
            &fixtures::trends_payload(&(1..=60).collect::<Vec<u32>>()),
        )));
        SurveyContext::with_api_key(
            config,
            ApiKey::parse("abcdef0123456789abcdef0123456789").unwrap(),
            transport,
            Arc::new(MemoryStore::new()),
        )
    }

    #[tokio::test]
    async fn test_empty_entity_list_finishes_every_phase() {
        let ctx = context(5);
        let store = MemoryStore::new();
        let harvester = TrendHarvester::new(&ctx, HarvestStores::single(&store));

        assert_eq!(harvester.resume(today()).await.unwrap(), InvocationOutcome::Finished);
        assert!(harvester.current().await.unwrap().is_none());
        for phase in Phase::ALL {
            assert_eq!(
                store.read_header(phase.series_name()).await.unwrap(),
                phase.header(today())
            );
        }
    }

    #[tokio::test]
    async fn test_series_keeps_last_weeks_only() {
        let ctx = context(5);
        let store = MemoryStore::with_entities(&["Hoya kerrii"]);
        let harvester = TrendHarvester::new(&ctx, HarvestStores::single(&store));
        harvester.resume(today()).await.unwrap();

        let rows = store.read_rows("Trends 90d").await.unwrap();
        let TrendRow::Series(series) = &rows[0].1 else {
            panic!("expected a series row");
        };
        assert_eq!(series.values.len(), 13);
        assert_eq!(series.values.last(), Some(&Some(60.0)));
    }

    #[tokio::test]
    async fn test_resume_cancels_pending_triggers() {
        let ctx = context(1);
        let store = MemoryStore::with_entities(&["Hoya kerrii", "Hoya carnosa", "Hoya pubicalyx"]);
        let harvester = TrendHarvester::new(&ctx, HarvestStores::single(&store));

        harvester.resume(today()).await.unwrap();
        harvester.resume(today()).await.unwrap();
        assert_eq!(store.pending(HARVEST_HANDLER).await.unwrap().len(), 1);

        harvester.reset().await.unwrap();
        assert!(store.pending(HARVEST_HANDLER).await.unwrap().is_empty());
        assert!(harvester.current().await.unwrap().is_none());
    }
}
