//! Example of reading sensor values asynchronously.
//!
//! This example uses embassy and the async façade of the sen6x-driver crate to
//! read sensor values for 5 minutes, skipping cycles without new data.

#![no_std]
#![no_main]

use defmt::*;
use embassy_executor::Spawner;
use embassy_rp::i2c::InterruptHandler;
use embassy_time::{Duration, Timer};
use sen6x_driver::asynchronous::Sen6X;
use sen6x_driver::{DriverConfig, NoStore, PollOutcome, Variant};
use {defmt_rtt as _, panic_probe as _};

embassy_rp::bind_interrupts!(struct Irqs {
    I2C1_IRQ => InterruptHandler<embassy_rp::peripherals::I2C1>;
});

#[embassy_executor::main]
async fn main(_task_spawner: Spawner) {
    let p = embassy_rp::init(Default::default());

    let sda = p.PIN_26;
    let scl = p.PIN_27;
    let config = embassy_rp::i2c::Config::default();
    let mut bus = embassy_rp::i2c::I2c::new_async(p.I2C1, scl, sda, Irqs, config);
    let mut delay = embassy_time::Delay;

    let config = DriverConfig::default()
        .with_variant(Variant::Sen66)
        .with_update_interval_ms(1000);
    let mut sen6x = Sen6X::with_config(&mut delay, &mut bus, config, NoStore);

    match sen6x.init().await {
        Ok(_) => info!("Device info: {:?}", sen6x.device_info()),
        Err(e) => error!("Initialization failed: {:?}", e),
    }

    // Start measurement
    match sen6x.start_measurement().await {
        Ok(_) => info!("Measurement started"),
        Err(e) => error!("Error starting measurement: {:?}", e),
    }

    // Read measurements for 5 minutes
    for _ in 0..300 {
        Timer::after(Duration::from_millis(sen6x.update_interval_ms() as u64)).await;
        match sen6x.poll().await {
            Ok(PollOutcome::Sample(readings)) => {
                info!("Sample: {:?}\n", readings);
            }
            Ok(PollOutcome::NotReady) => debug!("No new data"),
            Ok(outcome) => debug!("Poll: {:?}", outcome),
            Err(e) => error!("Error reading values: {:?}", e),
        }
    }

    match sen6x.read_status().await {
        Ok(status) => info!("Status: {:?}", status),
        Err(e) => error!("Error reading status: {:?}", e),
    }

    // Stop measurement
    match sen6x.stop_measurement().await {
        Ok(_) => info!("Measurement stopped"),
        Err(e) => error!("Error stopping measurement: {:?}", e),
    }

    // Just some loop so we never return
    info!("Entering infinite loop");
    loop {
        Timer::after(Duration::from_millis(1000)).await;
    }
}
