use futures_util::{SinkExt, StreamExt};
use shared::{ClientMessage, ServerMessage, TankType};
use tokio::time::{interval, Duration};
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// Headless smoke-test client: connects, handshakes as a starter tank, then
/// wanders for a few seconds while printing everything the server sends.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "ws://127.0.0.1:8080".to_string());

    println!("Connecting to {}", url);
    let (ws, _) = connect_async(&url).await?;
    println!("Connected");

    let (mut sink, mut stream) = ws.split();

    let hello = ClientMessage::SetName {
        name: "smoke-test".to_string(),
        tank_type: Some(TankType::Starter),
    };
    sink.send(Message::Text(serde_json::to_string(&hello)?.into()))
        .await?;

    let mut move_timer = interval(Duration::from_millis(500));
    let deadline = tokio::time::sleep(Duration::from_secs(10));
    tokio::pin!(deadline);

    let mut x = 0.0f32;
    loop {
        tokio::select! {
            _ = &mut deadline => break,

            _ = move_timer.tick() => {
                x += 1.0;
                let step = ClientMessage::Move { x, y: 0.0, z: 0.0, rot_y: 0.0 };
                sink.send(Message::Text(serde_json::to_string(&step)?.into())).await?;
            }

            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<ServerMessage>(&text) {
                        Ok(message) => println!("<- {:?}", message),
                        Err(_) => println!("<- (unrecognized) {}", text),
                    }
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    eprintln!("Read error: {}", e);
                    break;
                }
                None => {
                    println!("Server closed the connection");
                    break;
                }
            },
        }
    }

    sink.send(Message::Close(None)).await?;
    println!("Done");
    Ok(())
}
