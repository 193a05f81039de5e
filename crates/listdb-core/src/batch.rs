//! Bounded page-by-page batch processing.
//!
//! A [`BatchRunner`] processes at most `pages_per_iteration` pages of a
//! [`BatchJob`] per call and reports where to resume. Scheduling the next
//! iteration is left to the caller.

use std::sync::Arc;

use listdb_proto::{ListQuery, ResultRow};
use tracing::{debug, info, instrument};

use crate::config::EngineConfig;
use crate::error::Error;
use crate::pagination;
use crate::query::QueryEngine;

/// Result of processing one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOutcome {
    /// The page held this many items.
    Processed(u64),
    /// The page was empty; the job is complete.
    NoData,
}

/// Outcome of one runner iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStep {
    /// The page budget ran out; resume at `next_page`.
    Continue { processed: u64, next_page: u64 },
    /// The job ran out of data.
    Done { processed: u64 },
}

/// A job processed one page at a time.
pub trait BatchJob {
    /// Job name, used in logs.
    fn name(&self) -> &str;

    /// Process one 1-based page of `page_size` items.
    fn process_page(&mut self, page: u64, page_size: u64) -> Result<PageOutcome, Error>;
}

/// Runs [`BatchJob`]s in bounded iterations.
#[derive(Debug, Clone, Copy)]
pub struct BatchRunner {
    page_size: u64,
    pages_per_iteration: u64,
}

impl BatchRunner {
    pub fn new(page_size: u64, pages_per_iteration: u64) -> Self {
        Self {
            page_size,
            pages_per_iteration,
        }
    }

    /// Create a runner with the configured page size and budget.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.page_size, config.pages_per_iteration)
    }

    /// Process pages starting at `start_page` until the job runs dry or the
    /// page budget is spent. A failing page aborts the iteration.
    #[instrument(skip(self, job), fields(job = job.name()))]
    pub fn run_iteration<J: BatchJob + ?Sized>(
        &self,
        job: &mut J,
        start_page: u64,
    ) -> Result<BatchStep, Error> {
        if self.page_size == 0 {
            return Err(Error::Validation("batch page size must be positive".to_string()));
        }
        if self.pages_per_iteration == 0 {
            return Err(Error::Validation(
                "batch iteration must allow at least one page".to_string(),
            ));
        }

        let mut processed = 0;
        let mut page = start_page.max(1);
        for _ in 0..self.pages_per_iteration {
            match job.process_page(page, self.page_size)? {
                PageOutcome::Processed(n) => {
                    debug!(page, items = n, "page processed");
                    processed += n;
                    page += 1;
                }
                PageOutcome::NoData => {
                    info!(processed, last_page = page, "batch job finished");
                    return Ok(BatchStep::Done { processed });
                }
            }
        }

        info!(processed, next_page = page, "batch iteration paused");
        Ok(BatchStep::Continue {
            processed,
            next_page: page,
        })
    }
}

/// Pages a list query through the engine and hands each page to a sink.
pub struct QueryExportJob<F> {
    engine: Arc<QueryEngine>,
    query: ListQuery,
    sink: F,
}

impl<F> QueryExportJob<F>
where
    F: FnMut(u64, Vec<ResultRow>) -> Result<(), Error>,
{
    /// Create an export job. The query's own limit and offset are replaced
    /// per page; it needs an order for stable paging.
    pub fn new(engine: Arc<QueryEngine>, query: ListQuery, sink: F) -> Self {
        Self {
            engine,
            query,
            sink,
        }
    }
}

impl<F> BatchJob for QueryExportJob<F>
where
    F: FnMut(u64, Vec<ResultRow>) -> Result<(), Error>,
{
    fn name(&self) -> &str {
        &self.query.entity
    }

    fn process_page(&mut self, page: u64, page_size: u64) -> Result<PageOutcome, Error> {
        let limit = i64::try_from(page_size)
            .map_err(|_| Error::Validation(format!("page size {page_size} is too large")))?;
        let page_number = i64::try_from(page)
            .map_err(|_| Error::Validation(format!("page {page} is too large")))?;
        let offset = pagination::offset(limit, page_number) as u64;

        let mut query = self.query.clone().with_limit(page_size);
        query.offset = Some(offset);
        query.unlimited_rows = false;

        let rows = self.engine.execute(&query)?.rows;
        if rows.is_empty() {
            return Ok(PageOutcome::NoData);
        }

        let count = rows.len() as u64;
        (self.sink)(page, rows)?;
        Ok(PageOutcome::Processed(count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Yields `total` items in pages.
    struct Counter {
        total: u64,
        seen: Vec<u64>,
        fail_on: Option<u64>,
    }

    impl Counter {
        fn new(total: u64) -> Self {
            Self {
                total,
                seen: vec![],
                fail_on: None,
            }
        }
    }

    impl BatchJob for Counter {
        fn name(&self) -> &str {
            "counter"
        }

        fn process_page(&mut self, page: u64, page_size: u64) -> Result<PageOutcome, Error> {
            if self.fail_on == Some(page) {
                return Err(Error::DataSource("page failed".to_string()));
            }
            let start = (page - 1) * page_size;
            if start >= self.total {
                return Ok(PageOutcome::NoData);
            }
            self.seen.push(page);
            Ok(PageOutcome::Processed((self.total - start).min(page_size)))
        }
    }

    #[test]
    fn test_iterations_until_done() {
        let runner = BatchRunner::new(10, 3);
        let mut job = Counter::new(45);

        let step = runner.run_iteration(&mut job, 1).unwrap();
        assert_eq!(
            step,
            BatchStep::Continue {
                processed: 30,
                next_page: 4
            }
        );

        let step = runner.run_iteration(&mut job, 4).unwrap();
        assert_eq!(step, BatchStep::Done { processed: 15 });
        assert_eq!(job.seen, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_empty_job_is_done_immediately() {
        let runner = BatchRunner::new(10, 3);
        let mut job = Counter::new(0);
        assert_eq!(
            runner.run_iteration(&mut job, 1).unwrap(),
            BatchStep::Done { processed: 0 }
        );
    }

    #[test]
    fn test_failure_aborts_iteration() {
        let runner = BatchRunner::new(10, 5);
        let mut job = Counter::new(100);
        job.fail_on = Some(2);

        assert!(matches!(
            runner.run_iteration(&mut job, 1),
            Err(Error::DataSource(_))
        ));
        assert_eq!(job.seen, vec![1]);
    }

    #[test]
    fn test_zero_page_size_rejected() {
        let runner = BatchRunner::new(0, 5);
        let mut job = Counter::new(10);
        assert!(runner.run_iteration(&mut job, 1).unwrap_err().is_validation());
    }

    #[test]
    fn test_from_config() {
        let config = EngineConfig::default()
            .with_page_size(25)
            .with_pages_per_iteration(2);
        let runner = BatchRunner::from_config(&config);
        let mut job = Counter::new(200);
        assert_eq!(
            runner.run_iteration(&mut job, 1).unwrap(),
            BatchStep::Continue {
                processed: 50,
                next_page: 3
            }
        );
    }
}
