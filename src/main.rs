use std::{sync::Arc, time::Duration};

use actix_web::{App, HttpServer, middleware::Logger, web};
use clap::Parser;
use config::Config;
use confit::{
    api,
    cluster::{client::PeerClient, guard, protocol, reconciler},
    model::common::AppState,
    settings::Settings,
    snapshot::Shared,
};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use tokio::sync::mpsc;

use tracing::{Subscriber, info, subscriber::set_global_default};
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_log::LogTracer;
use tracing_subscriber::{EnvFilter, Registry, fmt::MakeWriter, layer::SubscriberExt};

#[derive(Parser)]
#[command()]
struct Cli {
    #[arg(short = 'c', long = "config", default_value = "conf/application.yml")]
    config: String,
    #[arg(long = "node-type")]
    node_type: Option<String>,
}

#[actix_web::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Cli::parse();

    let subscriber = get_subscriber("confit", "info", std::io::stdout);
    init_subscriber(subscriber);

    let mut config_builder = Config::builder();
    config_builder = config_builder.add_source(config::File::with_name(&args.config));
    if let Some(node_type) = args.node_type {
        config_builder = config_builder.set_override("node.type", node_type)?;
    }

    let settings = Settings::new(config_builder.build()?);
    settings.validate()?;

    let mut opt = ConnectOptions::new(settings.db_url()?);
    opt.max_connections(settings.db_max_connections())
        .min_connections(settings.db_min_connections())
        .connect_timeout(Duration::from_secs(settings.db_connect_timeout()));

    let db: DatabaseConnection = Database::connect(opt).await?;

    // Role guard: a node that cannot establish a coherent role must not
    // come up at all.
    guard::check_node_validity(&db, &settings).await?;
    guard::ensure_data_version(&db).await?;
    let shared = Arc::new(Shared::new(guard::load_mem(&db).await?));
    guard::init_node_rows(&db, &shared, &settings).await?;

    let peer = Arc::new(PeerClient::new(
        &settings.cluster_secret(),
        settings.rpc_timeout_secs(),
    )?);

    let (node_sync_tx, node_sync_rx) = if settings.is_master() {
        let (tx, rx) = mpsc::channel(16);
        (Some(tx), Some(rx))
    } else {
        (None, None)
    };

    let state = AppState {
        settings: settings.clone(),
        db,
        shared,
        peer,
        node_sync_tx,
    };

    if let Some(rx) = node_sync_rx {
        protocol::spawn_node_fanout(state.clone(), rx);
    }

    if !settings.is_master() {
        // The first check must succeed before the node serves clients;
        // afterwards divergence is repaired in the background.
        reconciler::check_master_once(&state).await?;
        reconciler::spawn(state.clone());
    }

    info!(
        role = %settings.node_kind(),
        client_addr = %settings.client_addr(),
        "node starting"
    );

    let api_state = state.clone();
    let api_server = HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(web::Data::new(api_state.clone()))
            .service(api::client::routes())
            .service(api::op::routes())
    })
    .bind(settings.http_addr())?
    .run();

    let peer_state = state.clone();
    let peer_server = HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(web::Data::new(peer_state.clone()))
            .service(api::peer::routes())
    })
    .bind(settings.node_bind_addr())?
    .run();

    tokio::try_join!(api_server, peer_server)?;

    Ok(())
}

pub fn get_subscriber(
    name: &str,
    env_filter: &str,
    sink: impl for<'a> MakeWriter<'a> + 'static + Send + Sync,
) -> impl Subscriber + Send + Sync {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(env_filter));
    let formatting_layer = BunyanFormattingLayer::new(name.into(), sink);

    Registry::default()
        .with(env_filter)
        .with(JsonStorageLayer)
        .with(formatting_layer)
}

pub fn init_subscriber(subscriber: impl Subscriber + Send + Sync) {
    LogTracer::init().expect("Failed to set logger");
    set_global_default(subscriber).expect("Failed to set subscriber");
}
