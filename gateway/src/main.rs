//
// Copyright 2025-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//


use clap::Parser;
use muportal_gateway::config::{Arguments, Configuration};
use muportal_gateway::connection::{ConnectionCallbacks, ConnectionHandle};
use muportal_gateway::manager::NetworkManager;
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Load arguments from the command line
    let arguments: Arguments = Parser::parse();

    // Initialize tracing/logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .with_ansi(true)
        .init();

    // Load environment variables from .env file if specified
    if let Some(ref env_file) = arguments.env_file {
        if std::path::Path::new(env_file).exists() {
            debug!("Loading environment variables from file: {}", env_file);
            dotenv::from_filename(env_file).ok();
        }
    } else {
        debug!("Loading environment variables from default file");
        dotenv::dotenv().ok();
    }

    // Load configuration from a file with environment variable substitution
    let config: Configuration = Configuration::load(&arguments.config_file)
        .inspect_err(|err| eprintln!("Configuration load error: {}", err))
        .expect("Unable to load configuration file");

    debug!("Configuration loaded: {:?}", config);
    info!("Starting MUD Portal Gateway...");

    let mut manager =
        NetworkManager::from_config(&config).expect("Unable to initialize network manager");

    manager.set_on_connect(|handle: ConnectionHandle| {
        let capabilities = handle.capabilities();
        info!(
            id = handle.id(),
            peer = %handle.peer(),
            kind = %handle.kind(),
            client = capabilities.client_name.as_deref().unwrap_or("unknown"),
            width = capabilities.width,
            height = capabilities.height,
            "Player connected"
        );
        if let Err(err) = handle.send_line("Welcome to MUD Portal. Type 'quit' to leave.") {
            warn!(%err, "Unable to greet player");
        }
    });

    manager.set_connection_callbacks(|_| {
        ConnectionCallbacks::new()
            .on_command(|handle, line| {
                let result = match line.trim() {
                    "quit" => handle
                        .send_line("Goodbye.")
                        .and_then(|_| handle.disconnect()),
                    "" => Ok(()),
                    other => handle.send_line(format!("You said: {}", other)),
                };
                if let Err(err) = result {
                    warn!(id = handle.id(), %err, "Unable to answer player");
                }
            })
            .on_update(|handle| {
                let capabilities = handle.capabilities();
                debug!(
                    id = handle.id(),
                    width = capabilities.width,
                    height = capabilities.height,
                    terminal = capabilities.terminal_type.as_deref().unwrap_or("unknown"),
                    "Client capabilities updated"
                );
            })
            .on_structured_data(|handle| {
                for data in handle.take_structured_data() {
                    debug!(id = handle.id(), ?data, "Structured data received");
                }
            })
            .on_disconnect(|id| info!(id, "Player disconnected"))
    });

    let manager = Arc::new(manager);
    manager
        .start()
        .await
        .expect("Unable to start listeners");

    tokio::signal::ctrl_c()
        .await
        .expect("Unable to listen for shutdown signal");

    info!("Shutting down MUD Portal Gateway...");
    manager.shutdown();
    // Give connections a moment to flush their goodbyes
    tokio::time::sleep(std::time::Duration::from_millis(250)).await;
}
