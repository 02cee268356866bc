#![allow(dead_code)]

use async_trait::async_trait;
use futures_util::StreamExt;
use rmq_rpc::{
    connector::ConnectOpts,
    consumer::{ConsumeOpts, Delivery},
    exchange::{DeclareExchangeOpts, DeleteExchangeOpts},
    publisher::{PublishOpts, Publishing},
    queue::{DeclareQueueOpts, QueueBindOpts, QueueDeleteOpts, QueueInfo},
    transport::{AmqpChannel, AmqpConnection, DeliveryStream, Transport},
    AmqpError, Client,
};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

pub type DeliverySender = UnboundedSender<Result<Delivery, AmqpError>>;

/// What the broker saw, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Connected,
    ChannelOpened,
    Consume {
        queue: String,
        consumer_tag: String,
        no_ack: bool,
        exclusive: bool,
    },
    Publish {
        exchange: String,
        routing_key: String,
        correlation_id: Option<String>,
        body: Vec<u8>,
    },
    Ack(u64),
    Nack(u64, bool),
    Cancel(String),
    ChannelClosed,
    ConnectionClosed,
}

#[derive(Default)]
struct State {
    exchanges: HashMap<String, DeclareExchangeOpts>,
    queues: HashMap<String, DeclareQueueOpts>,
    bindings: Vec<(String, String, String)>,
    messages: HashMap<String, u32>,
    events: Vec<Event>,
    deliveries: Option<UnboundedReceiver<Result<Delivery, AmqpError>>>,
    connect_attempts: u32,
    failing_connects: u32,
    generated: u32,
}

/// In-memory broker checking declarations for equivalence like a real one.
#[derive(Clone, Default)]
pub struct FakeBroker {
    state: Arc<Mutex<State>>,
}

impl FakeBroker {
    pub fn new() -> (FakeBroker, DeliverySender) {
        let (tx, rx) = unbounded_channel();
        let broker = FakeBroker::default();
        broker.state.lock().unwrap().deliveries = Some(rx);
        (broker, tx)
    }

    /// Makes the next `count` connection attempts fail.
    pub fn fail_connects(&self, count: u32) {
        self.state.lock().unwrap().failing_connects = count;
    }

    pub fn client(&self) -> Client {
        Client::with_transport(Arc::new(self.clone()))
    }

    pub fn events(&self) -> Vec<Event> {
        self.state.lock().unwrap().events.clone()
    }

    pub fn connect_attempts(&self) -> u32 {
        self.state.lock().unwrap().connect_attempts
    }

    pub fn count(&self, event: &Event) -> usize {
        self.events().iter().filter(|e| *e == event).count()
    }

    pub fn has_queue(&self, name: &str) -> bool {
        self.state.lock().unwrap().queues.contains_key(name)
    }

    pub fn bindings(&self) -> Vec<(String, String, String)> {
        self.state.lock().unwrap().bindings.clone()
    }

    pub fn enqueue(&self, queue: &str, count: u32) {
        *self
            .state
            .lock()
            .unwrap()
            .messages
            .entry(queue.to_owned())
            .or_default() += count;
    }

    fn record(&self, event: Event) {
        self.state.lock().unwrap().events.push(event);
    }
}

#[async_trait]
impl Transport for FakeBroker {
    async fn connect(&self, _opts: &ConnectOpts) -> Result<Box<dyn AmqpConnection>, AmqpError> {
        {
            let mut state = self.state.lock().unwrap();
            state.connect_attempts += 1;
            if state.failing_connects > 0 {
                state.failing_connects -= 1;
                return Err(AmqpError::TransportError("connection refused".into()));
            }
        }

        self.record(Event::Connected);
        Ok(Box::new(FakeConnection {
            broker: self.clone(),
        }))
    }
}

struct FakeConnection {
    broker: FakeBroker,
}

#[async_trait]
impl AmqpConnection for FakeConnection {
    async fn channel(&self) -> Result<Box<dyn AmqpChannel>, AmqpError> {
        self.broker.record(Event::ChannelOpened);
        Ok(Box::new(FakeChannel {
            broker: self.broker.clone(),
        }))
    }

    async fn close(&self) -> Result<(), AmqpError> {
        self.broker.record(Event::ConnectionClosed);
        Ok(())
    }
}

struct FakeChannel {
    broker: FakeBroker,
}

#[async_trait]
impl AmqpChannel for FakeChannel {
    async fn exchange_declare(
        &self,
        name: &str,
        opts: &DeclareExchangeOpts,
    ) -> Result<(), AmqpError> {
        let mut state = self.broker.state.lock().unwrap();
        match state.exchanges.get(name) {
            Some(existing) if existing != opts => Err(AmqpError::DeclareExchangeError(
                name.to_owned(),
                "PRECONDITION_FAILED - inequivalent arg".into(),
            )),
            Some(_) => Ok(()),
            None => {
                state.exchanges.insert(name.to_owned(), opts.clone());
                Ok(())
            }
        }
    }

    async fn exchange_delete(
        &self,
        name: &str,
        _opts: &DeleteExchangeOpts,
    ) -> Result<(), AmqpError> {
        let mut state = self.broker.state.lock().unwrap();
        match state.exchanges.remove(name) {
            Some(_) => Ok(()),
            None => Err(AmqpError::DeleteExchangeError(
                name.to_owned(),
                "NOT_FOUND".into(),
            )),
        }
    }

    async fn queue_declare(
        &self,
        name: &str,
        opts: &DeclareQueueOpts,
    ) -> Result<QueueInfo, AmqpError> {
        let mut state = self.broker.state.lock().unwrap();

        let name = if name.is_empty() {
            state.generated += 1;
            format!("amq.gen-{}", state.generated)
        } else {
            name.to_owned()
        };

        if let Some(existing) = state.queues.get(&name) {
            if existing.durable != opts.durable
                || existing.auto_delete != opts.auto_delete
                || existing.exclusive != opts.exclusive
                || existing.args != opts.args
            {
                return Err(AmqpError::DeclareQueueError(
                    name,
                    "PRECONDITION_FAILED - inequivalent arg".into(),
                ));
            }
        } else {
            state.queues.insert(name.clone(), opts.clone());
        }

        let message_count = state.messages.get(&name).copied().unwrap_or_default();
        Ok(QueueInfo {
            name,
            message_count,
            consumer_count: 0,
        })
    }

    async fn queue_bind(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
        _opts: &QueueBindOpts,
    ) -> Result<(), AmqpError> {
        let mut state = self.broker.state.lock().unwrap();
        if !state.queues.contains_key(queue) || !state.exchanges.contains_key(exchange) {
            return Err(AmqpError::BindingExchangeToQueueError(
                exchange.to_owned(),
                queue.to_owned(),
                "NOT_FOUND".into(),
            ));
        }

        state.bindings.push((
            exchange.to_owned(),
            queue.to_owned(),
            routing_key.to_owned(),
        ));
        Ok(())
    }

    async fn queue_unbind(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
        _opts: &QueueBindOpts,
    ) -> Result<(), AmqpError> {
        let mut state = self.broker.state.lock().unwrap();
        state
            .bindings
            .retain(|(e, q, k)| !(e == exchange && q == queue && k == routing_key));
        Ok(())
    }

    async fn queue_delete(&self, name: &str, _opts: &QueueDeleteOpts) -> Result<u32, AmqpError> {
        let mut state = self.broker.state.lock().unwrap();
        if state.queues.remove(name).is_none() {
            return Err(AmqpError::DeleteQueueError(
                name.to_owned(),
                "NOT_FOUND".into(),
            ));
        }
        Ok(state.messages.remove(name).unwrap_or_default())
    }

    async fn queue_purge(&self, name: &str, _no_wait: bool) -> Result<u32, AmqpError> {
        let mut state = self.broker.state.lock().unwrap();
        if !state.queues.contains_key(name) {
            return Err(AmqpError::PurgeQueueError(
                name.to_owned(),
                "NOT_FOUND".into(),
            ));
        }
        Ok(state.messages.remove(name).unwrap_or_default())
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        _opts: &PublishOpts,
        msg: &Publishing,
    ) -> Result<(), AmqpError> {
        self.broker.record(Event::Publish {
            exchange: exchange.to_owned(),
            routing_key: routing_key.to_owned(),
            correlation_id: msg.correlation_id.clone(),
            body: msg.body.clone(),
        });
        Ok(())
    }

    async fn consume(
        &self,
        queue: &str,
        consumer_tag: &str,
        opts: &ConsumeOpts,
    ) -> Result<DeliveryStream, AmqpError> {
        let deliveries = self.broker.state.lock().unwrap().deliveries.take();
        let Some(rx) = deliveries else {
            return Err(AmqpError::ConsumerDeclarationError(
                consumer_tag.to_owned(),
                "already consuming".into(),
            ));
        };

        self.broker.record(Event::Consume {
            queue: queue.to_owned(),
            consumer_tag: consumer_tag.to_owned(),
            no_ack: opts.no_ack,
            exclusive: opts.exclusive,
        });

        Ok(
            futures_util::stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|item| (item, rx))
            })
            .boxed(),
        )
    }

    async fn cancel(&self, consumer_tag: &str) -> Result<(), AmqpError> {
        self.broker.record(Event::Cancel(consumer_tag.to_owned()));
        Ok(())
    }

    async fn ack(&self, delivery_tag: u64) -> Result<(), AmqpError> {
        self.broker.record(Event::Ack(delivery_tag));
        Ok(())
    }

    async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<(), AmqpError> {
        self.broker.record(Event::Nack(delivery_tag, requeue));
        Ok(())
    }

    async fn close(&self) -> Result<(), AmqpError> {
        self.broker.record(Event::ChannelClosed);
        Ok(())
    }
}

/// A request delivery asking for a reply on `reply_to`.
pub fn request(tag: u64, reply_to: Option<&str>) -> Delivery {
    Delivery {
        delivery_tag: tag,
        exchange: "rpc".into(),
        routing_key: "orders.get".into(),
        correlation_id: Some(format!("corr-{tag}")),
        reply_to: reply_to.map(str::to_owned),
        data: format!("request-{tag}").into_bytes(),
        ..Delivery::default()
    }
}
