/********************************************************************************
 * Copyright (c) 2026 Contributors to the Eclipse Foundation
 *
 * See the NOTICE file(s) distributed with this work for additional
 * information regarding copyright ownership.
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

//! Control-plane layer.
//!
//! Owns the live-connection table and the ordered teardown of everything
//! that feeds it. The registry is the crate's only shared mutable state:
//! a single owned table behind a lock, with access restricted to its own
//! operations and every critical section kept short. Connection and handler
//! identity are pointer-based, so two `Arc`s name the same registry entry
//! exactly when they share an allocation.

pub(crate) mod identity;
pub(crate) mod registry;
pub(crate) mod shutdown;
