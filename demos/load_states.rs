//! Observe the bootstrap state machine the way a UI loading indicator
//! does, and show that concurrent first calls share one load.

use std::sync::Arc;

use pyground::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    let loader = Arc::new(RuntimeLoader::new(SandboxConfig::default()));

    // Watch state transitions from a separate task.
    let mut rx = loader.subscribe();
    let watcher = tokio::spawn(async move {
        loop {
            let state = *rx.borrow_and_update();
            println!("load state: {state:?}");
            if matches!(state, LoadState::Ready | LoadState::Failed) {
                break;
            }
            if rx.changed().await.is_err() {
                break;
            }
        }
    });

    // Two callers race to trigger the load; only one fetch happens and
    // both end up with the same handle.
    let (a, b) = tokio::join!(loader.ensure_runtime(), loader.ensure_runtime());
    let (a, b) = (a?, b?);
    println!("handles identical: {}", Arc::ptr_eq(&a, &b));

    watcher.await.ok();

    let executor = CodeExecutor::new(Arc::clone(&loader));
    let result = executor.execute("print('ready to go')").await?;
    print!("{}", result.output);

    Ok(())
}
