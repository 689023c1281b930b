// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use crate::context::AppContext;
use crate::helpers::print_status;
use anyhow::Result;
use cbx_evm::RecordId;
use cbx_lifecycle::DecryptOutcome;

pub async fn execute(ctx: &AppContext, id: RecordId) -> Result<()> {
    let decrypted = ctx.lifecycle.decrypt(&ctx.session, &id).await;
    print_status(ctx.session.notifier());
    match decrypted? {
        DecryptOutcome::Decrypted(amount) => println!("{id}: {amount}"),
        DecryptOutcome::AlreadyVerified(amount) => println!("{id}: {amount} (already verified)"),
    }
    Ok(())
}
