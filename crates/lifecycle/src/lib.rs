// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

mod error;
mod gateway;
mod ids;
mod lifecycle;
mod notifier;
mod registry;
mod session;

pub use error::*;
pub use gateway::*;
pub use ids::*;
pub use lifecycle::*;
pub use notifier::*;
pub use registry::*;
pub use session::*;
