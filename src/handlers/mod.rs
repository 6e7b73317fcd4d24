use rocket::serde::json::{Json, Value, json};
use rocket::{Request, catch, get};

pub mod misc;

#[get("/")]
pub fn index() -> Json<Value> {
    Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[catch(404)]
pub fn catch404(req: &Request<'_>) -> Json<Value> {
    Json(json!({
        "error": format!("No route for {}", req.uri()),
        "status": 404
    }))
}

#[catch(500)]
pub fn catch500() -> Json<Value> {
    Json(json!({
        "error": "Internal server error",
        "status": 500
    }))
}
