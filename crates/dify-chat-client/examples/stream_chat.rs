use dify_chat_client::prelude::*;
use dify_chat_client::event_stream;
use futures::StreamExt as _;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), ClientError> {
    let client = DifyClient::from_env()?;
    let body = client
        .send_chat_message(&ChatRequest::new("Stream a greeting.", "stream-example"))
        .await?;

    let mut events = Box::pin(event_stream(body));
    while let Some(event) = events.next().await {
        match event {
            Ok(ChatEvent::Message(message)) => print!("{}", decode_stream_content(&message.answer)),
            Ok(ChatEvent::MessageEnd(end)) => {
                let tokens = end.usage().map(|u| u.total_tokens).unwrap_or_default();
                println!("\n[{} tokens]", tokens);
            }
            Err(error) => eprintln!("stream error: {error}"),
        }
    }
    Ok(())
}
