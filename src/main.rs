use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::{UnboundedReceiverStream, WatchStream};
use tokio_stream::StreamExt;
use tracing::info;
use tracing_subscriber::EnvFilter;

use medscan_portal::config::Config;
use medscan_portal::pages::{self, admin, auth, doctor, patient, Loadable};
use medscan_portal::services::ai::ScanImage;
use medscan_portal::services::hub::{ConnectionState, APPOINTMENT_CANCELLED, APPOINTMENT_CREATED};
use medscan_portal::sync::SlotUpdates;
use medscan_portal::utils::formatters::{format_date, format_time, slot_on, split_today, translate_status};
use medscan_portal::AppState;

#[derive(Parser)]
#[command(name = "medscan-portal", about = "MedScan portal client")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in and keep the token for later commands
    Login { email: String, password: String },
    /// Forget the stored token
    Logout,
    /// Show who the stored token belongs to
    Whoami,
    /// Admin dashboard counters
    Admin,
    /// Doctor list (admin)
    Doctors {
        #[arg(long)]
        active: bool,
    },
    /// Today's schedule (doctor)
    Schedule,
    /// Your appointments (patient)
    Appointments,
    /// Cancel one of your appointments (patient)
    Cancel { appointment_id: String },
    /// Book an appointment (patient), e.g. `book d1 2025-10-30 "03:30 PM" checkup`
    Book {
        doctor_id: String,
        date: NaiveDate,
        slot: String,
        reason: String,
    },
    /// Your medical profile (patient)
    Profile,
    /// Analyze a scan image (patient)
    Diagnose { image: PathBuf },
    /// Ask the assistant (patient)
    Chat { message: String },
    /// Stream hub connection changes and appointment events until Ctrl-C
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().context("loading configuration")?;
    let state = AppState::from_config(config);

    match cli.command {
        Command::Login { email, password } => {
            let landing = auth::login(&state, &email, &password)
                .await
                .map_err(|err| anyhow!(err.user_message()))?;
            println!("signed in, landing page {landing}");
        }
        Command::Logout => {
            auth::sign_out(&state.session);
            println!("signed out");
        }
        Command::Whoami => whoami(&state),
        Command::Admin => {
            let counts = admin::load_admin_panel(&state).await?;
            println!("appointments:        {}", show(&counts.appointments));
            println!("today's appointments: {}", show(&counts.today_appointments));
            println!("doctors:             {}", show(&counts.doctors));
            println!("patients:            {}", show(&counts.patients));
        }
        Command::Doctors { active } => {
            let filter = if active {
                admin::DoctorFilter::Active
            } else {
                admin::DoctorFilter::All
            };
            print_json(admin::load_doctors(&state, filter).await?)?;
        }
        Command::Schedule => {
            let dashboard = doctor::load_doctor_dashboard(&state).await?;
            print_json(dashboard.overview)?;
        }
        Command::Appointments => {
            let list = require_loaded(patient::load_appointments(&state).await?)?;
            let (today, other) = split_today(&list, Local::now().date_naive());
            for (heading, group) in [("today", today), ("upcoming and past", other)] {
                println!("{heading}:");
                for appt in group {
                    println!(
                        "  {}  {} {}  {}  {}",
                        appt.appointment_id,
                        format_date(&appt.date),
                        format_time(&appt.date),
                        appt.doctor_name.as_deref().unwrap_or("-"),
                        translate_status(appt.status.as_deref()),
                    );
                }
            }
        }
        Command::Cancel { appointment_id } => {
            patient::cancel_appointment(&state, &appointment_id)
                .await
                .map_err(|err| anyhow!(err.user_message()))?;
            println!("cancelled {appointment_id}");
        }
        Command::Book {
            doctor_id,
            date,
            slot,
            reason,
        } => {
            let at = slot_on(date, &slot);
            patient::book_appointment(&state, &doctor_id, at, &reason)
                .await
                .map_err(|err| anyhow!(err.user_message()))?;
            println!("booked with {doctor_id}");
        }
        Command::Profile => print_json(patient::load_medical_profile(&state).await?)?,
        Command::Diagnose { image } => {
            let bytes = tokio::fs::read(&image)
                .await
                .with_context(|| format!("reading {}", image.display()))?;
            let file_name = image
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "scan".into());
            let diagnosis = patient::analyze_scan(&state, ScanImage { file_name, bytes })
                .await?
                .map_err(|err| anyhow!(err.user_message()))?;
            println!("diagnosis:  {}", diagnosis.diagnosis.as_deref().unwrap_or("-"));
            println!("confidence: {}", diagnosis.confidence.as_deref().unwrap_or("-"));
            if let Some(advice) = diagnosis.advice {
                println!("advice:     {advice}");
            }
        }
        Command::Chat { message } => {
            let reply = patient::ask_assistant(&state, &message)
                .await?
                .map_err(|err| anyhow!(err.user_message()))?;
            println!("{}", serde_json::to_string_pretty(&reply)?);
        }
        Command::Watch => watch(&state).await?,
    }
    Ok(())
}

fn whoami(state: &AppState) {
    let Some(claims) = state.session.claims() else {
        println!("not signed in");
        return;
    };
    println!("user id: {}", claims.user_id.as_deref().unwrap_or("-"));
    println!("role:    {}", claims.role.as_deref().unwrap_or("-"));
    println!("expired: {}", state.session.is_token_expired());
}

fn show(value: &Loadable<u64>) -> String {
    match value {
        Loadable::Loading => "...".into(),
        Loadable::Loaded(n) => n.to_string(),
        Loadable::Failed(message) => format!("error: {message}"),
    }
}

fn require_loaded<T>(value: Loadable<T>) -> Result<T> {
    match value {
        Loadable::Loaded(value) => Ok(value),
        Loadable::Failed(message) => bail!(message),
        Loadable::Loading => bail!("still loading"),
    }
}

fn print_json<T: Serialize>(value: Loadable<T>) -> Result<()> {
    let value = require_loaded(value)?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

async fn next_count(updates: &mut Option<SlotUpdates<u64>>) -> Option<Loadable<u64>> {
    match updates {
        Some(updates) => updates.next().await,
        None => std::future::pending().await,
    }
}

enum WatchItem {
    State(ConnectionState),
    Event(&'static str, Vec<Value>),
}

/// Connects to the hub and prints what arrives. Admins also get the live
/// appointment counter.
async fn watch(state: &AppState) -> Result<()> {
    let panel = match pages::guard(&state.session, pages::Page::AdminPanel) {
        Ok(_) => Some(admin::AdminPanel::mount(state).await?),
        Err(_) => None,
    };

    let (tx, rx) = mpsc::unbounded_channel();
    let _subscriptions: Vec<_> = [APPOINTMENT_CREATED, APPOINTMENT_CANCELLED]
        .into_iter()
        .map(|event| {
            let tx = tx.clone();
            state.hub.subscribe(event, move |args| {
                let _ = tx.send(WatchItem::Event(event, args.to_vec()));
            })
        })
        .collect();

    let mut items = WatchStream::new(state.hub.subscribe_state())
        .map(WatchItem::State)
        .merge(UnboundedReceiverStream::new(rx));

    let mut counts = panel.as_ref().map(|panel| panel.appointments.updates());
    if panel.is_none() {
        if let Err(err) = state.hub.start_connection().await {
            info!(error = %err, "first connection attempt failed, retrying in background");
        }
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            item = items.next() => match item {
                Some(WatchItem::State(conn)) => println!("hub: {conn:?}"),
                Some(WatchItem::Event(event, args)) => println!("{event}: {}", Value::Array(args)),
                None => break,
            },
            Some(count) = next_count(&mut counts) => println!("appointments: {}", show(&count)),
        }
    }

    state.hub.stop().await;
    Ok(())
}
