// SPDX-FileCopyrightText: Copyright 2024 LG Electronics Inc.
// SPDX-License-Identifier: Apache-2.0

//! Generated client/server types for the `configctl` gRPC service.

pub mod configctl {
    tonic::include_proto!("configctl");
}
