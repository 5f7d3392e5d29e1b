use std::ffi::OsString;
use std::process;

use log::{error, info};
use tokio::process::Command;

use quicklink::{
    app::{self, AppResult},
    config::{Config, StoreBackend},
    db::Database,
    errors::AppError,
    supervisor::{shutdown_signal, RestartPolicy, Role, Supervisor, WORKER_ID_ENV},
};

fn main() {
    // Load application configuration
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Critical configuration error: {}", e);
            process::exit(2);
        }
    };

    let role = match Role::detect(config.cluster.enabled) {
        Ok(role) => role,
        Err(e) => {
            eprintln!("Critical configuration error: {}", e);
            process::exit(2);
        }
    };

    // Setup enhanced logging based on configuration
    if let Err(e) = app::setup_logging(&config, role) {
        eprintln!("{}", e);
        process::exit(3);
    }

    let result = match role {
        Role::Coordinator => run_coordinator(config),
        Role::Worker(_) | Role::Standalone => run_server(config, role),
    };

    // Run the server with error handling for critical failures
    if let Err(err) = result {
        let code = match &err {
            AppError::Server(e) => {
                error!("Critical server error: {}", e);
                1
            }
            AppError::Config(e) => {
                error!("Critical configuration error: {}", e);
                2
            }
            AppError::Logger(e) => {
                error!("Critical logger error: {}", e);
                3
            }
            AppError::Database(e) => {
                error!("Critical database error: {}", e);
                4
            }
            AppError::Supervisor(e) => {
                error!("Critical supervisor error: {}", e);
                5
            }
            _ => {
                error!("Unexpected error: {}", err);
                1
            }
        };
        process::exit(code);
    }
}

/// Prepares the schema once, then keeps the worker processes running.
fn run_coordinator(config: Config) -> AppResult<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        if config.app.store_backend == StoreBackend::Postgres {
            Database::initialize(&config.db).await?;
        }

        // Workers are this same binary with the same arguments
        let exe = std::env::current_exe()?;
        let args: Vec<OsString> = std::env::args_os().skip(1).collect();

        let supervisor = Supervisor::new(
            config.cluster.workers,
            RestartPolicy::from(&config.cluster),
            move |id| {
                let mut cmd = Command::new(&exe);
                cmd.args(&args).env(WORKER_ID_ENV, id.to_string());
                cmd
            },
        );

        supervisor.run(shutdown_signal()).await?;
        info!("Coordinator exiting");
        Ok(())
    })
}

fn run_server(config: Config, role: Role) -> AppResult<()> {
    actix_web::rt::System::new().block_on(async move {
        // Workers rely on the coordinator having prepared the schema
        if role == Role::Standalone && config.app.store_backend == StoreBackend::Postgres {
            Database::initialize(&config.db).await?;
        }
        app::server(config, role).await
    })
}
