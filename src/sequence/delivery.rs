//! Hand-off of send requests to the external delivery collaborator.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use crate::campaign::SendRequest;
use crate::error::DeliveryError;

/// Receives finished send requests. Transport is someone else's job.
#[async_trait]
pub trait DeliverySink: Send + Sync {
    async fn deliver(&self, request: SendRequest) -> Result<(), DeliveryError>;
}

/// Forwards send requests over a bounded channel to whatever drains it.
#[derive(Clone)]
pub struct ChannelDelivery {
    tx: mpsc::Sender<SendRequest>,
}

impl ChannelDelivery {
    /// Create a sink and the receiver the delivery worker reads from.
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<SendRequest>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl DeliverySink for ChannelDelivery {
    async fn deliver(&self, request: SendRequest) -> Result<(), DeliveryError> {
        debug!(lead_id = %request.lead_id, to = %request.to_email, "Handing off send request");
        self.tx
            .send(request)
            .await
            .map_err(|_| DeliveryError::ChannelClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> SendRequest {
        SendRequest {
            lead_id: "l1".into(),
            to_email: "ada@example.com".into(),
            subject: "Hi".into(),
            body: "Body".into(),
            campaign_id: "c1".into(),
            sequence_step_id: None,
        }
    }

    #[tokio::test]
    async fn forwards_requests_in_order() {
        let (sink, mut rx) = ChannelDelivery::new(4);
        sink.deliver(request()).await.unwrap();
        let mut second = request();
        second.lead_id = "l2".into();
        sink.deliver(second).await.unwrap();

        assert_eq!(rx.recv().await.unwrap().lead_id, "l1");
        assert_eq!(rx.recv().await.unwrap().lead_id, "l2");
    }

    #[tokio::test]
    async fn closed_receiver_is_an_error() {
        let (sink, rx) = ChannelDelivery::new(1);
        drop(rx);
        let err = sink.deliver(request()).await.unwrap_err();
        assert!(matches!(err, DeliveryError::ChannelClosed));
    }
}
