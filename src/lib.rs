pub mod auth;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod schema;

use actix_web::{middleware::Logger, web, App, HttpServer};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use auth::TokenManager;
pub use db::{create_pool, DbPool};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Run any pending Diesel migrations against the pool's database.
pub fn run_migrations(pool: &DbPool) {
    let mut conn = pool.get().expect("Failed to get DB connection for migrations");
    conn.run_pending_migrations(MIGRATIONS)
        .expect("Failed to run database migrations");
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::auth::register,
        handlers::auth::login,
        handlers::products::list_products,
        handlers::products::create_product,
        handlers::products::update_stock,
        handlers::orders::create_order,
        handlers::orders::get_user_orders,
        handlers::orders::cancel_order,
        handlers::coupons::list_coupons,
        handlers::coupons::create_coupon,
        handlers::coupons::apply_coupon,
    ),
    tags(
        (name = "auth", description = "Registration and login"),
        (name = "products", description = "Product catalog"),
        (name = "orders", description = "Order placement and cancellation"),
        (name = "coupons", description = "Coupon listing, creation and redemption"),
    )
)]
pub struct ApiDoc;

/// Build and return an actix-web `Server` bound to `host:port`.
///
/// The caller is responsible for `.await`-ing (or `tokio::spawn`-ing) the
/// returned server.
pub fn build_server(
    pool: DbPool,
    tokens: TokenManager,
    host: &str,
    port: u16,
) -> std::io::Result<actix_web::dev::Server> {
    let tokens = web::Data::new(tokens);

    Ok(HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(pool.clone()))
            .app_data(tokens.clone())
            .wrap(Logger::default())
            .route("/register", web::post().to(handlers::auth::register))
            .route("/login", web::post().to(handlers::auth::login))
            .service(
                web::scope("/products")
                    .route("", web::get().to(handlers::products::list_products))
                    .route("", web::post().to(handlers::products::create_product))
                    .route("/{id}/stock", web::patch().to(handlers::products::update_stock)),
            )
            .service(
                web::scope("/orders")
                    .route("", web::post().to(handlers::orders::create_order))
                    .route("", web::get().to(handlers::orders::get_user_orders))
                    .route("/{id}/cancel", web::post().to(handlers::orders::cancel_order))
                    .route(
                        "/{order_id}/apply-coupon",
                        web::post().to(handlers::coupons::apply_coupon),
                    ),
            )
            .service(
                web::scope("/coupons")
                    .route("", web::get().to(handlers::coupons::list_coupons))
                    .route("", web::post().to(handlers::coupons::create_coupon)),
            )
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", ApiDoc::openapi()),
            )
    })
    .bind((host.to_string(), port))?
    .run())
}
