use clap::Parser;
use radius_aaa::crypto;
use radius_aaa::{
    AaaContext, AcctService, AuditLogger, AuthService, Config, LdapDirectory, MemoryDirectory,
    MemoryStore, PostgresStore, RadiusServer, SessionStore,
};
use std::path::Path;
use std::process;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Multi-vendor RADIUS AAA server
#[derive(Parser, Debug)]
#[command(author, about, long_about = None)]
#[command(name = "radius-aaa")]
struct Cli {
    /// Path to configuration file
    #[arg(value_name = "CONFIG", default_value = "config.json")]
    config_path: String,

    /// Validate configuration and exit (doesn't start server)
    #[arg(long)]
    validate: bool,

    /// Print the stored form of a subscriber password under the configured key
    #[arg(long, value_name = "PLAINTEXT")]
    encrypt_password: Option<String>,

    /// Print version information and exit
    #[arg(short = 'V', long)]
    version: bool,
}

fn init_tracing(default_filter: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.version {
        println!("radius-aaa v{}", env!("CARGO_PKG_VERSION"));
        println!("Repository: {}", env!("CARGO_PKG_REPOSITORY"));
        println!("License: {}", env!("CARGO_PKG_LICENSE"));
        process::exit(0);
    }

    if !Path::new(&cli.config_path).exists() && !cli.validate {
        init_tracing("info");
        warn!("Config file {} not found", cli.config_path);
        info!("Creating example configuration at: {}", cli.config_path);
        if let Err(e) = Config::example().to_file(&cli.config_path) {
            error!("Error creating example config: {}", e);
            process::exit(1);
        }
        info!("Please edit {} and restart the server", cli.config_path);
        process::exit(0);
    }

    let config = match Config::from_file(&cli.config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error in {}: {}", cli.config_path, e);
            process::exit(1);
        }
    };

    if let Some(ref plaintext) = cli.encrypt_password {
        match crypto::encrypt_to_b64(plaintext, &config.aes_key) {
            Ok(encoded) => {
                println!("{}", encoded);
                process::exit(0);
            }
            Err(e) => {
                eprintln!("Encryption failed: {}", e);
                process::exit(1);
            }
        }
    }

    if cli.validate {
        println!("Configuration validated successfully");
        println!();
        println!("  Auth listen: {}:{}", config.listen_address, config.auth_port);
        println!("  Acct listen: {}:{}", config.listen_address, config.acct_port);
        println!("  NAS devices: {}", config.nas.len());
        println!("  Subscribers: {}", config.subscribers.len());
        println!("  LDAP nodes: {}", config.ldap.len());
        println!(
            "  Session store: {}",
            if config.database_url.is_some() { "postgres" } else { "memory" }
        );
        println!("  Log level: {}", config.effective_log_level());
        process::exit(0);
    }

    init_tracing(config.effective_log_level());

    info!("radius-aaa v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded configuration from: {}", cli.config_path);

    if let Err(e) = run(config).await {
        error!("Server error: {}", e);
        process::exit(1);
    }
}

async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let store: Arc<dyn SessionStore> = match config.database_url {
        Some(ref url) => {
            let pg = PostgresStore::from_url(url).await?;
            pg.migrate().await?;
            info!("Session store: postgres");
            Arc::new(pg)
        }
        None => {
            info!("Session store: memory");
            Arc::new(MemoryStore::new())
        }
    };

    let directory = Arc::new(MemoryDirectory::from_config(&config));
    info!(
        nas = directory.nas_count(),
        subscribers = directory.subscriber_count(),
        "Loaded local directory"
    );
    if directory.nas_count() == 0 {
        warn!("No NAS configured; every request will be rejected as unauthorized");
    }

    let audit = AuditLogger::spawn(
        Arc::clone(&store),
        config.radius.authlog_level,
        config.authlog_path.as_deref().map(Path::new),
        config.radius.authlog_queue_size,
    )?;

    let auth_addr = config.auth_addr()?;
    let acct_addr = config.acct_addr()?;
    let debug = config.radius.debug;
    let ldap_nodes = config.ldap.clone();
    let aes_key = config.aes_key.clone();
    let default_interim = config.radius.acct_interim_interval;

    let mut ctx = AaaContext::new(
        Arc::new(config),
        directory.clone(),
        directory,
        store,
        audit.clone(),
    );
    for node in ldap_nodes {
        let name = node.name.clone();
        let ldap = LdapDirectory::new(node, &aes_key, default_interim)?;
        info!(ldap_id = %name, "Registered LDAP node");
        ctx = ctx.with_ldap(name, Arc::new(ldap));
    }
    let ctx = Arc::new(ctx);

    let auth_server = RadiusServer::bind(auth_addr, Arc::new(AuthService::new(Arc::clone(&ctx))))
        .await?
        .with_debug(debug);
    let acct_server = RadiusServer::bind(acct_addr, Arc::new(AcctService::new(ctx)))
        .await?
        .with_debug(debug);

    info!("Server started successfully, press Ctrl+C to stop");

    let result: Result<(), Box<dyn std::error::Error>> = tokio::select! {
        r = auth_server.run() => r.map_err(Into::into),
        r = acct_server.run() => r.map_err(Into::into),
        r = tokio::signal::ctrl_c() => {
            info!("Shutting down");
            r.map_err(Into::into)
        }
    };

    audit.flush().await;
    result
}
