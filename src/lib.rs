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

//! PolicyShield: a declarative policy enforcement firewall for AI-agent tool
//! calls. Agent frameworks call `/api/v1/check` before executing a tool;
//! PolicyShield matches the call against a compiled rule-set and returns an
//! ALLOW/BLOCK/REDACT/APPROVE verdict.

pub mod approval;
pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod http;
pub mod matcher;
pub mod pii;
pub mod ratelimit;
pub mod reload;
pub mod rules;
pub mod sanitizer;
pub mod session;
pub mod trace;
pub mod types;
pub mod verdict;
