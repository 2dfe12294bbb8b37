//! Console front-end: a Bifrost session over stdin/stdout.

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;

use crate::bifrost::{IoClient, IoClientError};
use crate::comm::Client;
use crate::comm::bridge;

const IDENTITY: &str = "console";

/// Runs the console until stdin reaches EOF or `cancel` fires.
pub async fn run(client: Client, cancel: CancellationToken) {
    session(tokio::io::stdin(), tokio::io::stdout(), client, cancel).await;
}

async fn session<R, W>(reader: R, writer: W, client: Client, cancel: CancellationToken)
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    let (io, endpoint) = IoClient::new(reader, writer);
    bridge::serve(io, endpoint, client, IDENTITY, cancel, |e| match e {
        IoClientError::HungUp => tracing::debug!("Console input closed"),
        IoClientError::Parse(e) => eprintln!("-> invalid message: {e}"),
        IoClientError::Io(e) => eprintln!("-> got error: {e}"),
    })
    .await;
    tracing::debug!("Console session ended");
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;
    use crate::comm::Hub;
    use crate::list::List;

    #[tokio::test]
    async fn eof_on_input_ends_the_session() {
        let (hub, mut root) = Hub::new(List::new());
        let hub_task = tokio::spawn(hub.run());

        let (mut input, reader) = tokio::io::duplex(1024);
        let (writer, mut output) = tokio::io::duplex(1024);
        let console = tokio::spawn(session(
            reader,
            writer,
            root.copy().unwrap(),
            CancellationToken::new(),
        ));

        input.write_all(b"c1 auto on\nc2 dump\n").await.unwrap();
        drop(input);
        console.await.unwrap();

        let mut transcript = String::new();
        output.read_to_string(&mut transcript).await.unwrap();
        assert_eq!(
            transcript,
            format!(
                "! OHAI console baps3d-{}\n! IAMA list\n! AUTO on\nc2 AUTO on\nc2 COUNT 0\n",
                crate::BAPS3D_VERSION
            )
        );

        root.shutdown();
        while root.recv().await.is_some() {}
        hub_task.await.unwrap();
    }
}
