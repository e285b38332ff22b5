// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! HTTP surface: router, auth/admission middleware, error mapping and
//! metrics exposition (§6.1 "HTTP endpoints (wire)").

pub mod auth;
pub mod error_mapping;
pub mod idempotency;
pub mod limits;
pub mod metrics;
pub mod routes;
pub mod state;

pub use error_mapping::ApiError;
pub use routes::build_router;
pub use state::AppState;
