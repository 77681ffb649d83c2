//! Minimal end-to-end run: load the runtime, execute a snippet, print the
//! result the way a playground result panel would.

use std::sync::Arc;

use pyground::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    let loader = Arc::new(RuntimeLoader::new(SandboxConfig::default()));
    let executor = CodeExecutor::new(Arc::clone(&loader));

    println!("running snippet (first run downloads the interpreter)...");
    let result = executor
        .execute("for i in range(5):\n    print(i * i)")
        .await?;

    println!("--- output ---");
    print!("{}", result.output);
    if let Some(error) = result.error_message() {
        println!("--- error ---");
        println!("{error}");
    }
    println!("--- took {} ms ---", result.execution_time_ms());

    let expected = "0\n1\n4\n9\n16";
    println!(
        "matches expected output: {}",
        matches(&result.output, expected)
    );

    Ok(())
}
