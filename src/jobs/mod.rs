use std::sync::Arc;
use tokio::time::{interval, Duration, Instant};
use tracing::{error, info};

use crate::metrics;

pub mod tasks;

/// Job scheduler for background tasks
pub struct JobScheduler {
    context: Arc<crate::context::AppContext>,
}

impl JobScheduler {
    pub fn new(context: Arc<crate::context::AppContext>) -> Self {
        Self { context }
    }

    /// Start all background jobs
    pub fn start(self: Arc<Self>) {
        info!("Starting background job scheduler");

        tokio::spawn(Self::match_reconciliation_job(Arc::clone(&self)));
        tokio::spawn(Self::notification_retention_job(Arc::clone(&self)));
        tokio::spawn(Self::health_check_job(Arc::clone(&self)));

        info!("Background jobs started");
    }

    /// Repair mutual likes whose match step never completed
    async fn match_reconciliation_job(scheduler: Arc<Self>) {
        let period = scheduler.context.config.jobs.reconcile_interval.max(1);
        let mut interval = interval(Duration::from_secs(period));

        loop {
            interval.tick().await;
            let started = Instant::now();

            match tasks::reconcile_matches(&scheduler.context).await {
                Ok(count) => {
                    metrics::record_background_job("reconcile_matches", "success", started.elapsed().as_secs_f64());
                    if count > 0 {
                        info!("Reconciled {} matches", count);
                    }
                }
                Err(e) => {
                    metrics::record_background_job("reconcile_matches", "failure", started.elapsed().as_secs_f64());
                    error!("Failed to reconcile matches: {}", e);
                }
            }
        }
    }

    /// Purge read notifications past retention (daily by default)
    async fn notification_retention_job(scheduler: Arc<Self>) {
        let period = scheduler.context.config.jobs.notification_purge_interval.max(1);
        let mut interval = interval(Duration::from_secs(period));

        loop {
            interval.tick().await;
            info!("Running notification retention purge");
            let started = Instant::now();

            match tasks::purge_notifications(&scheduler.context).await {
                Ok(count) => {
                    metrics::record_background_job("purge_notifications", "success", started.elapsed().as_secs_f64());
                    if count > 0 {
                        info!("Purged {} read notifications", count);
                    } else {
                        info!("Notification purge: nothing past retention");
                    }
                }
                Err(e) => {
                    metrics::record_background_job("purge_notifications", "failure", started.elapsed().as_secs_f64());
                    error!("Failed to purge notifications: {}", e);
                }
            }

            scheduler.context.rate_limiter.retain_recent();
        }
    }

    /// Health check job (runs every 5 minutes)
    async fn health_check_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(300));

        loop {
            interval.tick().await;

            match tasks::health_check(&scheduler.context).await {
                Ok(_) => {
                    // Silent success
                }
                Err(e) => error!("Health check failed: {}", e),
            }
        }
    }
}
