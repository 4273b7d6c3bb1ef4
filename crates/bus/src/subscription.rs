use async_trait::async_trait;

/// A running subscription of a consumer group to a topic.
#[async_trait]
pub trait Subscription
where
    Self: Send + Sync + 'static,
{
    /// The subscribed topic.
    fn topic(&self) -> &str;

    /// The consumer group the subscription consumes for.
    fn consumer_group(&self) -> &str;

    /// Stops delivery and waits for the handler to return from the message
    /// it is processing, if any.
    async fn shutdown(&self);
}
