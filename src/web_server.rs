use std::sync::Arc;

use actix_web::{App, HttpServer, dev::Server, middleware, web};

use crate::config::ServerConfig;
use crate::orchestrator::Orchestrator;
use crate::queue::JobQueue;
use crate::routes::{
    health_handler, path_error_handler, post_execute_handler, query_error_handler,
};

pub fn build_server(
    server_config: ServerConfig,
    orchestrator: Arc<Orchestrator>,
    job_queue: Arc<JobQueue>,
) -> std::io::Result<Server> {
    let orchestrator = web::Data::from(orchestrator);
    let job_queue = web::Data::from(job_queue);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(orchestrator.clone())
            .app_data(job_queue.clone())
            .app_data(web::QueryConfig::default().error_handler(query_error_handler))
            .app_data(web::PathConfig::default().error_handler(path_error_handler))
            .wrap(middleware::Logger::default())
            .service(post_execute_handler)
            .service(health_handler)
    })
    .bind((
        server_config
            .bind_address
            .unwrap_or("127.0.0.1".to_string()),
        server_config.bind_port.unwrap_or(12345),
    ))?
    .run();

    Ok(server)
}
