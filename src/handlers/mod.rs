// Public:    POST /users, GET /users, POST /login, GET /health
// Protected: GET | PATCH | DELETE /users/:id (JWT required)
pub mod auth;
pub mod health;
pub mod users;
