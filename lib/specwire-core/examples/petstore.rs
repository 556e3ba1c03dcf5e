//! Fetch a Swagger 2.0 document and invoke one of its operations.
//!
//! ```shell
//! cargo run --example petstore -- http://petstore.swagger.io/v2/swagger.json getPetById petId=1
//! ```

use std::time::Duration;

use specwire_core::SwaggerClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let url = args
        .next()
        .unwrap_or_else(|| "http://petstore.swagger.io/v2/swagger.json".to_string());
    let operation_id = args.next().unwrap_or_else(|| "getPetById".to_string());

    let client = SwaggerClient::from_url(&url.parse()?).await?;
    let mut call = client.operation(&operation_id)?;
    for argument in args {
        if let Some((name, value)) = argument.split_once('=') {
            call = call.param(name, value);
        }
    }

    let outcome = call
        .also_return_response()
        .call()?
        .result(Some(Duration::from_secs(10)))
        .await?;

    let (value, response) = outcome.into_parts();
    if let Some(response) = &response {
        println!("status: {}", response.status_code());
    }
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}
