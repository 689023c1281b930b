// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use crate::context::AppContext;
use crate::helpers::print_status;
use anyhow::Result;
use cbx_lifecycle::NewProject;

pub async fn execute(
    ctx: &AppContext,
    name: String,
    target_amount: Option<u64>,
    description: String,
) -> Result<()> {
    let connected = ctx.lifecycle.connect(&ctx.session).await;
    if connected.is_err() {
        print_status(ctx.session.notifier());
    }
    connected?;

    let project = NewProject {
        name,
        target_amount,
        description,
    };
    let created = ctx.lifecycle.create_project(&ctx.session, project).await;
    print_status(ctx.session.notifier());
    println!("{}", created?);
    Ok(())
}
