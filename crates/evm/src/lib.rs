// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

mod adapter;
pub mod contracts;
pub mod provider;
mod records;

pub use adapter::*;
pub use contracts::{
    ReadOnly, ReadWrite, RegistryContract, RegistryContractFactory, RegistryReadContract,
    RegistryWriteContract,
};
pub use provider::{load_signer_from_env, ProviderConfig};
pub use records::*;
