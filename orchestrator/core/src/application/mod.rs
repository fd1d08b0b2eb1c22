// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod agent_loop;
pub mod investigation_service;
pub mod lead;
pub mod router;
pub mod specialists;
