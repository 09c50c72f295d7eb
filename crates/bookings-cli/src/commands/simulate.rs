use std::collections::HashSet;
use std::time::Duration;

use bookings_core::{
    Attendee, Booking, BookingId, BookingInput, BookingPatch, BookingStatus, BroadcastHub,
    IdStrategy, ReplicaConfig, ReplicaService, Stats,
};
use chrono::{Days, NaiveDate};
use serde::Serialize;
use tokio::time::{sleep, Instant};

use crate::error::CliError;

const QUIESCENCE_TIMEOUT: Duration = Duration::from_secs(5);
const QUIESCENCE_POLL: Duration = Duration::from_millis(10);
const CONTESTED_SEED_ID: &str = "seed-1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulationOptions {
    pub contexts: usize,
    pub creates: usize,
    pub strategy: IdStrategy,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicaReport {
    pub context: String,
    pub bookings: usize,
    pub stale_updates: usize,
    /// Deleted ids the replica still remembers
    pub tombstones: usize,
    pub stats: Stats,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationReport {
    pub contexts: usize,
    pub creates_per_context: usize,
    pub strategy: &'static str,
    pub created: usize,
    pub unique_ids: bool,
    pub converged: bool,
    pub replicas: Vec<ReplicaReport>,
}

impl SimulationReport {
    fn divergent(&self) -> usize {
        let Some(first) = self.replicas.first() else {
            return 0;
        };
        self.replicas
            .iter()
            .filter(|replica| replica.bookings != first.bookings || replica.stats != first.stats)
            .count()
    }
}

pub async fn run_simulate(
    config: &ReplicaConfig,
    options: SimulationOptions,
    as_json: bool,
) -> Result<(), CliError> {
    let report = simulate(config, options).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for line in format_report_lines(&report) {
            println!("{line}");
        }
    }

    if report.converged {
        Ok(())
    } else {
        Err(CliError::Diverged {
            divergent: report.divergent().max(1),
            contexts: report.contexts,
        })
    }
}

/// Run `options.contexts` replicas on one hub through concurrent creates,
/// cross-replica updates and deletes, then compare their final state.
pub async fn simulate(
    config: &ReplicaConfig,
    options: SimulationOptions,
) -> Result<SimulationReport, CliError> {
    if options.contexts == 0 {
        return Err(CliError::InvalidArgument(
            "--contexts must be at least 1".to_string(),
        ));
    }

    let hub = BroadcastHub::new();
    let mut replicas = Vec::with_capacity(options.contexts);
    for index in 0..options.contexts {
        let replica_config = ReplicaConfig {
            context_id: Some(format!("ctx-{}", index + 1)),
            id_strategy: options.strategy,
            ..config.clone()
        };
        let replica = ReplicaService::start(&replica_config, Some(&hub))?;
        let outcome = replica.bootstrap().await?;
        tracing::info!(context = %replica.context(), ?outcome, "Simulation replica joined");
        replicas.push(replica);
    }

    // Concurrent creates
    let mut tasks = Vec::with_capacity(replicas.len());
    for (index, replica) in replicas.iter().enumerate() {
        let replica = replica.clone();
        let creates = options.creates;
        tasks.push(tokio::spawn(async move {
            let mut created = Vec::with_capacity(creates);
            for n in 0..creates {
                created.push(replica.create(simulated_input(index, n)).await?.id);
            }
            Ok::<_, bookings_core::Error>(created)
        }));
    }
    let mut created: Vec<Vec<BookingId>> = Vec::with_capacity(tasks.len());
    for task in tasks {
        created.push(task.await??);
    }
    wait_for_quiescence(&replicas).await;

    // Cross-replica updates and deletes
    let count = replicas.len();
    let mut tasks = Vec::with_capacity(count);
    for (index, replica) in replicas.iter().enumerate() {
        let replica = replica.clone();
        let neighbour_first = created[(index + 1) % count].first().cloned();
        let own_last = (created[index].len() > 1)
            .then(|| created[index].last().cloned())
            .flatten();
        tasks.push(tokio::spawn(async move {
            if let Some(id) = neighbour_first {
                let patch = BookingPatch {
                    notes: Some(format!("confirmed by {}", replica.context())),
                    ..BookingPatch::status(BookingStatus::Confirmed)
                };
                replica.update(&id, patch).await?;
            }
            let contested = BookingId::new(CONTESTED_SEED_ID);
            if replica.get(&contested).await.is_some() {
                let patch = BookingPatch {
                    notes: Some(format!("last touched by {}", replica.context())),
                    ..BookingPatch::default()
                };
                replica.update(&contested, patch).await?;
            }
            if let Some(id) = own_last {
                replica.delete(&id).await?;
            }
            Ok::<_, bookings_core::Error>(())
        }));
    }
    for task in tasks {
        task.await??;
    }
    let converged = wait_for_quiescence(&replicas).await;

    let all_created: Vec<&BookingId> = created.iter().flatten().collect();
    let unique: HashSet<&BookingId> = all_created.iter().copied().collect();

    let mut reports = Vec::with_capacity(replicas.len());
    for replica in &replicas {
        reports.push(ReplicaReport {
            context: replica.context().to_string(),
            bookings: replica.all().await.len(),
            stale_updates: replica.stale_updates().await.len(),
            tombstones: replica.tombstones().await,
            stats: replica.stats().await,
        });
        replica.shutdown();
    }

    Ok(SimulationReport {
        contexts: options.contexts,
        creates_per_context: options.creates,
        strategy: options.strategy.as_str(),
        created: all_created.len(),
        unique_ids: unique.len() == all_created.len(),
        converged,
        replicas: reports,
    })
}

/// Poll until every replica holds the same bookings or the timeout passes
pub async fn wait_for_quiescence(replicas: &[ReplicaService]) -> bool {
    let deadline = Instant::now() + QUIESCENCE_TIMEOUT;
    loop {
        if all_equal(replicas).await {
            return true;
        }
        if Instant::now() >= deadline {
            tracing::warn!("Replicas did not converge before the deadline");
            return false;
        }
        sleep(QUIESCENCE_POLL).await;
    }
}

async fn all_equal(replicas: &[ReplicaService]) -> bool {
    let Some((first, rest)) = replicas.split_first() else {
        return true;
    };
    let reference: Vec<Booking> = first.snapshot().await;
    for replica in rest {
        if replica.snapshot().await != reference {
            return false;
        }
    }
    true
}

fn simulated_input(replica: usize, n: usize) -> BookingInput {
    let day = NaiveDate::from_ymd_opt(2026, 3, 1)
        .and_then(|start| start.checked_add_days(Days::new(u64::try_from(n % 28).unwrap_or(0))))
        .unwrap_or_default();
    BookingInput {
        event_type: "30-min Consultation".to_string(),
        attendee: Attendee::new(
            format!("Guest {}-{}", replica + 1, n + 1),
            format!("guest{}.{}@example.com", replica + 1, n + 1),
            "",
        ),
        date: day,
        time: "10:00 AM".to_string(),
        duration: "30 min".to_string(),
        status: BookingStatus::Pending,
        location: "Zoom".to_string(),
        notes: String::new(),
    }
}

pub fn format_report_lines(report: &SimulationReport) -> Vec<String> {
    let mut lines = vec![
        format!(
            "{} replicas x {} creates ({} ids)",
            report.contexts, report.creates_per_context, report.strategy
        ),
        format!(
            "created {}  unique ids: {}",
            report.created,
            if report.unique_ids { "yes" } else { "NO" }
        ),
    ];
    for replica in &report.replicas {
        lines.push(format!(
            "  {:<8}  bookings={:<4} stale={:<3} deleted={:<3} pending={} confirmed={} completed={} cancelled={}",
            replica.context,
            replica.bookings,
            replica.stale_updates,
            replica.tombstones,
            replica.stats.pending,
            replica.stats.confirmed,
            replica.stats.completed,
            replica.stats.cancelled
        ));
    }
    lines.push(if report.converged {
        "converged".to_string()
    } else {
        "DIVERGED".to_string()
    });
    lines
}
