//! Example of reading sensor values in blocking mode.
//!
//! This example uses rp-hal and the blocking façade of the sen6x-driver crate.
//! The variant is identified at startup, then the driver is polled once per
//! second for 5 minutes, followed by a fan cleaning cycle.

#![no_std]
#![no_main]

use defmt::*;
use embedded_hal::delay::DelayNs;
use hal::fugit::RateExtU32;
use hal::gpio::{FunctionI2C, Pin};
use rp235x_hal as hal;
use {defmt_rtt as _, panic_probe as _};

use sen6x_driver::blocking::Sen6X;
use sen6x_driver::{DriverConfig, DriverError, NoStore, PollOutcome, Sen6xError};

/// Tell the Boot ROM about our application
#[unsafe(link_section = ".start_block")]
#[used]
pub static IMAGE_DEF: hal::block::ImageDef = hal::block::ImageDef::secure_exe();

/// External high-speed crystal on the Raspberry Pi Pico 2 board is 12 MHz.
const XTAL_FREQ_HZ: u32 = 12_000_000u32;

#[hal::entry]
fn main() -> ! {
    let mut pac = hal::pac::Peripherals::take().unwrap();
    let mut watchdog = hal::Watchdog::new(pac.WATCHDOG);
    let clocks = hal::clocks::init_clocks_and_plls(
        XTAL_FREQ_HZ,
        pac.XOSC,
        pac.CLOCKS,
        pac.PLL_SYS,
        pac.PLL_USB,
        &mut pac.RESETS,
        &mut watchdog,
    )
    .unwrap();
    let sio = hal::Sio::new(pac.SIO);

    let pins = hal::gpio::Pins::new(
        pac.IO_BANK0,
        pac.PADS_BANK0,
        sio.gpio_bank0,
        &mut pac.RESETS,
    );
    let sda_pin: Pin<_, FunctionI2C, _> = pins.gpio26.reconfigure();
    let scl_pin: Pin<_, FunctionI2C, _> = pins.gpio27.reconfigure();

    // For loop delays
    let mut delay = hal::Timer::new_timer1(pac.TIMER1, &mut pac.RESETS, &clocks);

    let i2c = hal::I2C::i2c1(
        pac.I2C1,
        sda_pin,
        scl_pin,
        400.kHz(),
        &mut pac.RESETS,
        &clocks.system_clock,
    );
    // For driver to consume
    let mut timer = hal::Timer::new_timer0(pac.TIMER0, &mut pac.RESETS, &clocks);
    let config = DriverConfig::default().with_update_interval_ms(1000);
    let mut sen6x = Sen6X::with_config(&mut timer, i2c, config, NoStore);

    // Identify the module and apply the configured calibration
    match sen6x.init() {
        Ok(_) => {
            let info = sen6x.device_info();
            info!(
                "Found {:?}: {} ({})",
                sen6x.variant(),
                info.product_name.as_str(),
                info.serial_number.as_str()
            );
        }
        Err(e) => error!("Initialization failed: {:?}", e),
    }

    // Start measurement
    match sen6x.start_measurement() {
        Ok(_) => info!("Measurement started"),
        Err(e) => error!("Error starting measurement: {:?}", e),
    }

    // Read measurements for 5 minutes
    for _ in 0..300 {
        delay.delay_ms(sen6x.update_interval_ms());
        match sen6x.poll() {
            Ok(PollOutcome::Sample(readings)) => {
                for reading in readings.iter() {
                    match reading.value() {
                        Some(value) => {
                            info!("{:?}: {} {}", reading.channel, value, reading.unit().symbol())
                        }
                        None => warn!("{:?}: {:?}", reading.channel, reading.validity),
                    }
                }
            }
            Ok(outcome) => debug!("Poll: {:?}", outcome),
            Err(e) => error!("Error reading values: {:?}", e),
        }
    }

    // Stop measurement and clean the fan
    match sen6x.stop_measurement() {
        Ok(_) => info!("Measurement stopped"),
        Err(e) => error!("Error stopping measurement: {:?}", e),
    }
    if sen6x.start_fan_cleaning().is_ok() {
        loop {
            delay.delay_ms(sen6x.update_interval_ms());
            match sen6x.poll() {
                Err(Sen6xError::Driver(DriverError::Busy)) => info!("Fan cleaning..."),
                Ok(PollOutcome::Settled) => {
                    info!("Fan cleaning done");
                    break;
                }
                other => {
                    error!("Unexpected poll result: {:?}", other);
                    break;
                }
            }
        }
    }

    // Wait forever
    loop {
        hal::arch::wfi();
    }
}
