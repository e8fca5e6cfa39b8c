//! meetpoll server entry point.

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use meetpoll_api::{AppState, app};
use meetpoll_common::Config;
use meetpoll_core::{
    DbPollStore, DispatcherSettings, EmailService, LogEmailGateway, NotificationDispatcher,
    PollService, PollStoreService, ReminderScheduler, SettingsService, SmtpEmailGateway,
    TallyService, UserService, VoteService,
};
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received SIGINT, initiating graceful shutdown...");
        },
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}

fn email_gateway(config: &Config) -> anyhow::Result<EmailService> {
    match &config.smtp {
        Some(smtp) => {
            info!(host = %smtp.host, port = smtp.port, "Using SMTP email gateway");
            Ok(Arc::new(SmtpEmailGateway::new(smtp)?))
        }
        None => {
            info!("SMTP not configured, emails will be logged");
            Ok(Arc::new(LogEmailGateway))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "meetpoll=debug,tower_http=debug".into()),
        )
        .init();

    info!("Starting meetpoll server...");

    let config = Config::load().context("failed to load configuration")?;

    let db = Arc::new(meetpoll_db::init(&config).await?);
    info!("Connected to database");

    info!("Running database migrations...");
    meetpoll_db::migrate(&db).await?;
    info!("Migrations complete");

    let store: PollStoreService = Arc::new(DbPollStore::new(
        Arc::clone(&db),
        config.database.request_timeout(),
        config.notifications.batch_fetch_timeout(),
    ));

    let reminders = ReminderScheduler::new(store.clone());
    let state = AppState {
        user_service: UserService::new(store.clone()),
        vote_service: VoteService::new(store.clone()),
        tally_service: TallyService::new(store.clone()),
        poll_service: PollService::new(store.clone(), reminders),
        settings_service: SettingsService::new(store.clone()),
    };

    let dispatcher = NotificationDispatcher::new(
        store,
        email_gateway(&config)?,
        DispatcherSettings::from_config(&config),
    )
    .start();

    let router = app(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("invalid server.host/server.port")?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Stopping notification dispatcher...");
    dispatcher.stop().await;

    info!("Server shutdown complete");
    Ok(())
}
