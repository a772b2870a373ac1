use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, FromRef, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch},
    Json, Router,
};
use barista::{AuthConfig, AuthGuard};
use barista_axum::permission_guards;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::RwLock;
use tracing_subscriber::EnvFilter;

permission_guards! {
    permission GetDrinksDetail = "get:drinks-detail";
    permission PostDrinks = "post:drinks";
    permission PatchDrinks = "patch:drinks";
    permission DeleteDrinks = "delete:drinks";
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,barista=debug")),
        )
        .init();

    let config = AuthConfig::from_env()?;
    let guard = AuthGuard::from_config(&config)?;

    let _refresh = (!config.cache_ttl().is_zero()).then(|| {
        guard
            .verifier()
            .key_set_fetcher()
            .spawn_refresh(config.cache_ttl())
    });

    let state = AppState {
        guard,
        drinks: Arc::new(RwLock::new(Drinks::default())),
    };

    let app = Router::new()
        .route("/drinks", get(list_drinks).post(create_drink))
        .route("/drinks-detail", get(list_drinks_detail))
        .route("/drinks/:id", patch(update_drink).delete(delete_drink))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:5000").await?;
    tracing::info!(addr = %listener.local_addr()?, "serving drinks");
    axum::serve(listener, app).await?;

    Ok(())
}

#[derive(Clone)]
struct AppState {
    guard: AuthGuard,
    drinks: Arc<RwLock<Drinks>>,
}

impl FromRef<AppState> for AuthGuard {
    fn from_ref(state: &AppState) -> Self {
        state.guard.clone()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Ingredient {
    color: String,
    name: String,
    parts: u32,
}

#[derive(Clone, Debug)]
struct Drink {
    id: u64,
    title: String,
    recipe: Vec<Ingredient>,
}

impl Drink {
    fn short(&self) -> serde_json::Value {
        let recipe: Vec<_> = self
            .recipe
            .iter()
            .map(|i| json!({ "color": i.color, "parts": i.parts }))
            .collect();

        json!({ "id": self.id, "title": self.title, "recipe": recipe })
    }

    fn long(&self) -> serde_json::Value {
        json!({ "id": self.id, "title": self.title, "recipe": self.recipe })
    }
}

#[derive(Debug, Default)]
struct Drinks {
    next_id: u64,
    items: Vec<Drink>,
}

#[derive(Debug, Deserialize)]
struct DrinkInput {
    title: Option<String>,
    recipe: Option<Vec<Ingredient>>,
}

#[derive(Debug, PartialEq, Eq)]
enum ApiError {
    BadRequest,
    NotFound,
    Unprocessable,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest => (StatusCode::BAD_REQUEST, "bad request"),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "resource not found"),
            ApiError::Unprocessable => (StatusCode::UNPROCESSABLE_ENTITY, "unprocessable"),
        };

        let body = json!({
            "success": false,
            "error": status.as_u16(),
            "message": message,
        });

        (status, Json(body)).into_response()
    }
}

async fn list_drinks(State(state): State<AppState>) -> Json<serde_json::Value> {
    let drinks = state.drinks.read().await;
    let short: Vec<_> = drinks.items.iter().map(Drink::short).collect();

    Json(json!({ "success": true, "drinks": short }))
}

async fn list_drinks_detail(
    GetDrinksDetail(_): GetDrinksDetail,
    State(state): State<AppState>,
) -> Json<serde_json::Value> {
    let drinks = state.drinks.read().await;
    let long: Vec<_> = drinks.items.iter().map(Drink::long).collect();

    Json(json!({ "success": true, "drinks": long }))
}

async fn create_drink(
    _: PostDrinks,
    State(state): State<AppState>,
    input: Result<Json<DrinkInput>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Json(input) = input.map_err(|_| ApiError::Unprocessable)?;
    let (Some(title), Some(recipe)) = (input.title, input.recipe) else {
        return Err(ApiError::Unprocessable);
    };

    let mut drinks = state.drinks.write().await;
    if drinks.items.iter().any(|d| d.title == title) {
        return Err(ApiError::Unprocessable);
    }

    drinks.next_id += 1;
    let drink = Drink {
        id: drinks.next_id,
        title,
        recipe,
    };
    let body = json!({ "success": true, "drinks": [drink.long()] });
    drinks.items.push(drink);

    Ok(Json(body))
}

async fn update_drink(
    _: PatchDrinks,
    State(state): State<AppState>,
    Path(id): Path<u64>,
    input: Result<Json<DrinkInput>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Json(input) = input.map_err(|_| ApiError::Unprocessable)?;
    if input.title.is_none() && input.recipe.is_none() {
        return Err(ApiError::BadRequest);
    }

    let mut drinks = state.drinks.write().await;
    let drink = drinks
        .items
        .iter_mut()
        .find(|d| d.id == id)
        .ok_or(ApiError::NotFound)?;

    if let Some(title) = input.title {
        drink.title = title;
    }
    if let Some(recipe) = input.recipe {
        drink.recipe = recipe;
    }

    Ok(Json(json!({ "success": true, "drinks": [drink.long()] })))
}

async fn delete_drink(
    _: DeleteDrinks,
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut drinks = state.drinks.write().await;
    let idx = drinks
        .items
        .iter()
        .position(|d| d.id == id)
        .ok_or(ApiError::NotFound)?;

    drinks.items.remove(idx);

    Ok(Json(json!({ "success": true, "delete": id })))
}
