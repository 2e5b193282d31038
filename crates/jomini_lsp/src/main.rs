use std::sync::Arc;

use tower_lsp::{LspService, Server};

use jomini_lsp::{JominiServer, ServerState};

#[tokio::main]
async fn main() {
    env_logger::init();

    // Catalog tables and schemas are configuration: if they do not load, the
    // server refuses to start rather than run with partial rules.
    let state = match ServerState::new() {
        Ok(state) => Arc::new(state),
        Err(error) => {
            log::error!("configuration failed to load: {error}");
            eprintln!("jomini-ls: configuration failed to load: {error}");
            std::process::exit(1);
        }
    };

    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let (service, socket) = LspService::new(|client| JominiServer::new(client, state.clone()));
    Server::new(stdin, stdout, socket).serve(service).await;
}
