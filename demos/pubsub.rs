use std::time::Duration;

use mqttc::client::{Client, ClientConfig, ConnectionState, Event};
use mqttc::packet::{PacketType, Publish, QoS};

#[tokio::main]
async fn main() {
    simple_logger::SimpleLogger::new().init().unwrap();

    let mut config = ClientConfig::new("test.mosquitto.org", "mqttc-pubsub");
    config
        .set_keep_alive(Duration::from_secs(30))
        .set_clean_session(true);
    let mut client = Client::new(config);

    // Subscribe and publish once the broker accepts the session; the
    // messages come back through the subscription.
    client.on(PacketType::Connect, |client, event| {
        if let Event::ConnectionState(ConnectionState::Connected) = event {
            client.subscribe("mqttc/demo", QoS::AtLeastOnce).unwrap();
            for x in 1..=5 {
                let message = Publish::new("mqttc/demo", QoS::AtMostOnce, format!("hello {}", x));
                client.publish(message).unwrap();
            }
            let acked = Publish::new("mqttc/demo", QoS::AtLeastOnce, "hello, acknowledged");
            println!("Publish result: {:?}", client.publish(acked));
        }
    });
    client.on(PacketType::SubAck, |_, event| {
        println!("Subscription acknowledged: {:?}", event);
    });

    let mut seen = 0;
    client.on_message(move |client, message| {
        println!("{}: {:?}", message.topic, message.payload);
        seen += 1;
        if seen == 6 {
            client.stop();
        }
    });

    client.connect().await.unwrap();
    println!("Run result: {:?}", client.run().await);
}
