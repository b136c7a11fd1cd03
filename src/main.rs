use std::io;
use std::sync::Arc;

use actix_files as fs;
use actix_web::middleware::Logger;
use actix_web::{web, App, HttpResponse, HttpServer};
use chrono::Utc;
use openssl::ssl::{SslAcceptor, SslFiletype, SslMethod};

use couple_memory::auth::session_middleware;
use couple_memory::config::{Config, TlsFiles};
use couple_memory::{configure, credentials, db, inference, sessions, AppState};

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = Config::from_env().map_err(|e| {
        log::error!("invalid configuration: {e}");
        io::Error::new(io::ErrorKind::InvalidInput, e)
    })?;

    let db_pool = db::connect(&config.database_url).await.map_err(|e| {
        log::error!("cannot open {}: {e}", config.database_url);
        io::Error::new(io::ErrorKind::Other, e)
    })?;

    credentials::seed(&db_pool, &config.bootstrap)
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

    match sessions::purge_expired(&db_pool, Utc::now()).await {
        Ok(0) => {}
        Ok(purged) => log::info!("purged {purged} expired sessions"),
        Err(e) => log::warn!("could not purge expired sessions: {e}"),
    }

    let client = inference::from_settings(&config.inference)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

    let app_state = AppState::new(db_pool, Arc::from(client))
        .with_chat(config.chat.clone())
        .with_bootstrap(config.bootstrap.clone())
        .with_secure_cookies(config.cookie_secure);

    let secret_key = config.session_key();
    let cookie_secure = config.cookie_secure;
    let static_dir = config.static_dir.clone();

    let server = HttpServer::new(move || {
        let mut app = App::new()
            .app_data(web::Data::new(app_state.clone()))
            .configure(configure);
        if let Some(dir) = &static_dir {
            app = app.service(fs::Files::new("/", dir).index_file("index.html"));
        }
        app.default_service(web::route().to(|| async { HttpResponse::NotFound().finish() }))
            .wrap(session_middleware(secret_key.clone(), cookie_secure))
            .wrap(Logger::default())
    });

    let address = (config.ip.clone(), config.port);
    let server = match &config.tls {
        Some(tls) => {
            log::info!("listening on https://{}:{}", address.0, address.1);
            server.bind_openssl(address, ssl_acceptor(tls)?)?
        }
        None => {
            log::info!("listening on http://{}:{}", address.0, address.1);
            server.bind(address)?
        }
    };

    server.run().await
}

fn ssl_acceptor(tls: &TlsFiles) -> io::Result<openssl::ssl::SslAcceptorBuilder> {
    let to_io = |e: openssl::error::ErrorStack| io::Error::new(io::ErrorKind::Other, e);

    let mut builder = SslAcceptor::mozilla_intermediate(SslMethod::tls()).map_err(to_io)?;
    builder
        .set_private_key_file(&tls.private_key, SslFiletype::PEM)
        .map_err(to_io)?;
    builder
        .set_certificate_chain_file(&tls.certificate)
        .map_err(to_io)?;
    Ok(builder)
}
