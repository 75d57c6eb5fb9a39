//  _____       ______   ____
// |_   _|     |  ____|/ ____|  Institute of Embedded Systems
//   | |  _ __ | |__  | (___    Zurich University of Applied Sciences
//   | | | '_ \|  __|  \___ \   8401 Winterthur, Switzerland
//  _| |_| | | | |____ ____) |
// |_____|_| |_|______|_____/
//
// Copyright 2025 Institute of Embedded Systems at Zurich University of Applied Sciences.
// All rights reserved.
// SPDX-License-Identifier: MIT

//! MOBILE_OPERATOR entry point: once attached, fires a three-probe MAINT burst and counts the
//! MAINTACKs that come back. Its beacon timer is intentionally not rearmed after attaching (§9) —
//! this role visits a DODAG rather than remaining a permanent member of it.

use mote_core::RoleType;

#[embassy_executor::main]
async fn main(_spawner: embassy_executor::Spawner) {
    env_logger::init();
    mote_firmware::run(RoleType::MobileOperator).await;
}
