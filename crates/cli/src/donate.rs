// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use crate::context::AppContext;
use crate::helpers::print_status;
use anyhow::Result;
use cbx_evm::RecordId;

pub async fn execute(ctx: &AppContext, project: RecordId, amount: u64) -> Result<()> {
    let connected = ctx.lifecycle.connect(&ctx.session).await;
    if connected.is_err() {
        print_status(ctx.session.notifier());
    }
    connected?;

    let donated = ctx.lifecycle.donate(&ctx.session, &project, amount).await;
    print_status(ctx.session.notifier());
    println!("{}", donated?);
    Ok(())
}
