//! Simple sandbox example - run code in each language and stream output

use coderun_sandbox::{
    ExecutionEvent, ExecutionRequest, LanguageRegistry, SandboxConfig, SandboxService,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let config = SandboxConfig::default();
    let service = SandboxService::from_config(&config)?;

    println!("=== Sandbox Service Example ===\n");
    println!("Executor: {}", service.executor_name());
    println!("Workspace: {}\n", config.workspace_root.display());

    // Example 1: the stock program for every language
    let registry = LanguageRegistry::new(&config.toolchain);
    for profile in registry.profiles() {
        println!("Example: {}", profile.display_name);
        let request = ExecutionRequest::new(profile.language.id(), profile.default_code);
        execute_and_print(&service, request).await?;
    }

    // Example 2: stdin
    println!("\nExample: uppercase stdin");
    let request =
        ExecutionRequest::new("python", "print(input().upper())").with_stdin("hello\n");
    execute_and_print(&service, request).await?;

    // Example 3: timeout
    println!("\nExample: infinite loop");
    let request = ExecutionRequest::new("javascript", "while (true) {}");
    execute_and_print(&service, request).await?;

    Ok(())
}

async fn execute_and_print(
    service: &SandboxService,
    request: ExecutionRequest,
) -> anyhow::Result<()> {
    let mut stream = service.execute_stream(request).await;
    while let Some(event) = stream.next().await {
        match event {
            ExecutionEvent::Output { content } => print!("  stdout: {}", content),
            ExecutionEvent::Error { content } => print!("  stderr: {}", content),
            ExecutionEvent::Finished { result } => {
                println!("\n  {}", serde_json::to_string(&result)?);
            }
        }
    }
    Ok(())
}
