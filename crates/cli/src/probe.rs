// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use crate::context::AppContext;
use crate::helpers::print_status;
use anyhow::{bail, Result};

pub async fn execute(ctx: &AppContext) -> Result<()> {
    let available = ctx.lifecycle.probe_availability(&ctx.session).await;
    print_status(ctx.session.notifier());
    if !available {
        bail!("Registry contract is not available");
    }
    Ok(())
}
