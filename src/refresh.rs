//! Fetches new regions whenever the filter changes, without letting slow responses for an older
//! filter overwrite newer data.
//!
//! Every request gets a generation number. Only the response of the latest generation is ever
//! handed out to be shown; responses of superseded requests are dropped when they arrive.

use log::debug;
use poll_promise::Promise;
use std::sync::Arc;

use crate::region::RegionCollection;
use crate::source::{FetchResult, RegionSource};
use crate::status::HealthStatus;

/// What became of a finished request.
#[derive(Debug)]
pub enum RefreshOutcome {
    /// The latest request succeeded; its regions should replace the shown ones.
    Applied {
        /// Generation of the request.
        generation: u64,
        /// The status the regions were fetched for.
        status: HealthStatus,
        /// The new regions.
        data: RegionCollection,
    },

    /// The latest request failed.
    Failed {
        /// Generation of the request.
        generation: u64,
        /// The status that was requested.
        status: HealthStatus,
        /// Why it failed.
        error: Arc<eyre::Report>,
    },

    /// A newer request was issued before this one finished; its result is dropped.
    Discarded {
        /// Generation of the request.
        generation: u64,
        /// The status that was requested.
        status: HealthStatus,
    },
}

struct InFlight {
    generation: u64,
    status: HealthStatus,
    promise: Promise<FetchResult>,
}

/// Issues fetches through a [`RegionSource`] and sorts out which results may be shown.
pub struct RefreshPipeline {
    source: Box<dyn RegionSource>,
    generation: u64,
    in_flight: Vec<InFlight>,
}

impl RefreshPipeline {
    /// Creates a pipeline fetching from `source`.
    pub fn new(source: impl RegionSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            generation: 0,
            in_flight: Vec::new(),
        }
    }

    /// Starts fetching the regions of `status`, superseding every earlier request. Returns the
    /// generation of the new request.
    pub fn request(
        &mut self,
        status: HealthStatus,
        previous: Option<Arc<RegionCollection>>,
    ) -> u64 {
        self.generation += 1;
        debug!(
            "Requesting `{}` regions (generation {})",
            status, self.generation
        );
        let promise = self.source.fetch(status, previous);
        self.in_flight.push(InFlight {
            generation: self.generation,
            status,
            promise,
        });
        self.generation
    }

    /// Generation of the latest request, 0 before the first one.
    pub fn latest(&self) -> u64 {
        self.generation
    }

    /// Whether the latest request is still running.
    pub fn is_pending(&self) -> bool {
        self.in_flight
            .iter()
            .any(|in_flight| in_flight.generation == self.generation)
    }

    /// Number of requests that have not finished yet, superseded ones included.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Collects the requests that finished since the last call, in the order they were issued.
    pub fn poll(&mut self) -> Vec<RefreshOutcome> {
        let latest = self.generation;
        let mut outcomes = Vec::new();
        for InFlight {
            generation,
            status,
            promise,
        } in std::mem::take(&mut self.in_flight)
        {
            match promise.try_take() {
                Ok(result) => outcomes.push(settle(latest, generation, status, result)),
                Err(promise) => self.in_flight.push(InFlight {
                    generation,
                    status,
                    promise,
                }),
            }
        }
        outcomes
    }
}

fn settle(latest: u64, generation: u64, status: HealthStatus, result: FetchResult) -> RefreshOutcome {
    if generation != latest {
        debug!(
            "Dropping `{}` regions of generation {}, generation {} is newer",
            status, generation, latest
        );
        return RefreshOutcome::Discarded { generation, status };
    }
    match result {
        Ok(data) => RefreshOutcome::Applied {
            generation,
            status,
            data,
        },
        Err(error) => RefreshOutcome::Failed {
            generation,
            status,
            error,
        },
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::region::tests::squares;
    use poll_promise::Sender;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// A fetch that has been started and waits to be answered by the test.
    pub(crate) struct PendingFetch {
        pub(crate) status: HealthStatus,
        pub(crate) previous: Option<Arc<RegionCollection>>,
        pub(crate) sender: Sender<FetchResult>,
    }

    /// A source whose fetches are resolved by hand, in any order.
    #[derive(Clone, Default)]
    pub(crate) struct ManualSource {
        pub(crate) pending: Rc<RefCell<Vec<PendingFetch>>>,
    }

    impl ManualSource {
        /// Answers the oldest open fetch for `status`.
        pub(crate) fn resolve(&self, status: HealthStatus, result: FetchResult) {
            let mut pending = self.pending.borrow_mut();
            let idx = pending
                .iter()
                .position(|p| p.status == status)
                .expect("no open fetch for status");
            pending.remove(idx).sender.send(result);
        }

        pub(crate) fn open(&self) -> Vec<HealthStatus> {
            self.pending.borrow().iter().map(|p| p.status).collect()
        }
    }

    impl RegionSource for ManualSource {
        fn fetch(
            &self,
            status: HealthStatus,
            previous: Option<Arc<RegionCollection>>,
        ) -> Promise<FetchResult> {
            let (sender, promise) = Promise::new();
            self.pending.borrow_mut().push(PendingFetch {
                status,
                previous,
                sender,
            });
            promise
        }
    }

    fn counts(outcome: &RefreshOutcome) -> Vec<f64> {
        match outcome {
            RefreshOutcome::Applied { data, .. } => data.samples(),
            other => panic!("expected applied outcome, got {:?}", other),
        }
    }

    #[test]
    fn single_request_is_applied() {
        let source = ManualSource::default();
        let mut pipeline = RefreshPipeline::new(source.clone());
        assert_eq!(pipeline.latest(), 0);
        assert!(!pipeline.is_pending());

        assert_eq!(pipeline.request(HealthStatus::Active, None), 1);
        assert!(pipeline.is_pending());
        assert!(pipeline.poll().is_empty());

        source.resolve(HealthStatus::Active, Ok(squares(&[Some(4)])));
        let outcomes = pipeline.poll();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(counts(&outcomes[0]), vec![4.0]);
        assert!(!pipeline.is_pending());
        assert_eq!(pipeline.in_flight(), 0);
    }

    #[test]
    fn previous_collection_is_passed_to_the_source() {
        let source = ManualSource::default();
        let mut pipeline = RefreshPipeline::new(source.clone());
        let previous = Arc::new(squares(&[Some(1)]));
        pipeline.request(HealthStatus::Mild, Some(previous.clone()));

        let pending = source.pending.borrow();
        assert!(Arc::ptr_eq(pending[0].previous.as_ref().unwrap(), &previous));
    }

    #[test]
    fn newer_response_first_then_stale_one_is_dropped() {
        let source = ManualSource::default();
        let mut pipeline = RefreshPipeline::new(source.clone());
        pipeline.request(HealthStatus::Active, None);
        pipeline.request(HealthStatus::Died, None);

        source.resolve(HealthStatus::Died, Ok(squares(&[Some(9)])));
        let outcomes = pipeline.poll();
        assert_eq!(counts(&outcomes[0]), vec![9.0]);

        source.resolve(HealthStatus::Active, Ok(squares(&[Some(500)])));
        let outcomes = pipeline.poll();
        assert!(matches!(
            outcomes.as_slice(),
            [RefreshOutcome::Discarded {
                generation: 1,
                status: HealthStatus::Active
            }]
        ));
    }

    #[test]
    fn stale_response_first_is_dropped_and_newer_still_pending() {
        let source = ManualSource::default();
        let mut pipeline = RefreshPipeline::new(source.clone());
        pipeline.request(HealthStatus::Active, None);
        pipeline.request(HealthStatus::Died, None);

        source.resolve(HealthStatus::Active, Ok(squares(&[Some(500)])));
        let outcomes = pipeline.poll();
        assert!(matches!(
            outcomes.as_slice(),
            [RefreshOutcome::Discarded { generation: 1, .. }]
        ));
        assert!(pipeline.is_pending());

        source.resolve(HealthStatus::Died, Ok(squares(&[Some(9)])));
        let outcomes = pipeline.poll();
        assert_eq!(counts(&outcomes[0]), vec![9.0]);
    }

    #[test]
    fn failures_of_superseded_requests_are_dropped_too() {
        let source = ManualSource::default();
        let mut pipeline = RefreshPipeline::new(source.clone());
        pipeline.request(HealthStatus::Active, None);
        pipeline.request(HealthStatus::Recovered, None);

        source.resolve(
            HealthStatus::Active,
            Err(Arc::new(eyre::eyre!("connection reset"))),
        );
        source.resolve(
            HealthStatus::Recovered,
            Err(Arc::new(eyre::eyre!("bad gateway"))),
        );

        let outcomes = pipeline.poll();
        assert_eq!(outcomes.len(), 2);
        assert!(matches!(outcomes[0], RefreshOutcome::Discarded { generation: 1, .. }));
        match &outcomes[1] {
            RefreshOutcome::Failed {
                generation, error, ..
            } => {
                assert_eq!(*generation, 2);
                assert_eq!(error.to_string(), "bad gateway");
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert!(source.open().is_empty());
    }
}
