use dotenv::dotenv;
use log::{debug, info};
use pcf_lcd_driver::I2cBus;
use pcf_lcd_driver::lcd::hd44780::driver::Pcf8574HD44780Driver;
use pcf_lcd_driver::linux::LinuxI2cBus;
use pcf_lcd_driver::sim::SimulatedDisplay;
use std::env::var;
use std::thread::sleep;
use std::time::Duration;
use time::OffsetDateTime;
use time::macros::format_description;

const SMILEY: [u8; 8] = [
    0b00000, 0b00000, 0b01010, 0b01010, 0b00000, 0b10001, 0b01110, 0b00000,
];

fn env_or(name: &str, default: &str) -> String {
    var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_address(address_str: &str) -> eyre::Result<u8> {
    let address_str = address_str.trim();
    let address = match address_str
        .strip_prefix("0x")
        .or_else(|| address_str.strip_prefix("0X"))
    {
        Some(hex) => u8::from_str_radix(hex, 16)?,
        None => address_str.parse()?,
    };
    if address > 0x7f {
        eyre::bail!("I2C address 0x{:02x} is not a 7-bit address", address);
    }
    Ok(address)
}

fn parse_flag(flag_str: &str) -> eyre::Result<bool> {
    match flag_str.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(eyre::eyre!("Invalid flag value {:?}", other)),
    }
}

fn run<B>(lcd: &mut Pcf8574HD44780Driver<B>) -> eyre::Result<()>
where
    B: I2cBus,
    B::Error: Send + Sync + 'static,
{
    lcd.initialize()?;
    debug!("{:?} initialized.", lcd);

    lcd.display_off()?;
    lcd.clear()?;
    lcd.cursor_on(true)?;
    lcd.home()?;
    lcd.entry_mode(true, false)?;

    lcd.set_cursor(4, 1)?;
    lcd.write_str("Hi World!")?;
    sleep(Duration::from_millis(500));

    for _ in 0..6 {
        lcd.shift_display(true)?;
        sleep(Duration::from_millis(200));
    }
    for _ in 0..6 {
        lcd.shift_display(false)?;
        sleep(Duration::from_millis(200));
    }

    lcd.define_custom_glyph(0, &SMILEY)?;
    lcd.write_char('\0')?;

    let register = lcd.read_instruction_register()?;
    info!(
        "Busy flag: {}, address counter: 0x{:02x}",
        register & 0x80 != 0,
        register & 0x7f
    );
    lcd.set_cursor(4, 1)?;
    let data = lcd.read_data_register()?;
    info!("Character at (4, 1): {:?}", data as char);

    lcd.set_cursor(1, 0)?;
    lcd.write_str("Guten Tag")?;
    lcd.cursor_off()?;

    for _ in 0..3 {
        lcd.backlight_off()?;
        sleep(Duration::from_millis(300));
        lcd.backlight_on()?;
        sleep(Duration::from_millis(300));
    }

    let now = OffsetDateTime::now_local()?;
    let clock = now.format(format_description!("[hour]:[minute]:[second]"))?;
    lcd.set_cursor(0, 0)?;
    lcd.write_str(&clock)?;
    info!("Local time {} shown.", clock);

    Ok(())
}

fn main() -> eyre::Result<()> {
    // Initialize environment and logger
    dotenv().ok();
    pretty_env_logger::init();

    info!("PCF8574 LCD demo starting...");

    let bus_no: u8 = env_or("LCD_I2C_BUS", "1").parse()?;
    let address = parse_address(&env_or("LCD_I2C_ADDRESS", "0x27"))?;
    let poll_busy_flag = parse_flag(&env_or("LCD_POLL_BUSY_FLAG", "true"))?;
    let simulate = parse_flag(&env_or("LCD_SIMULATE", "false"))?;

    info!(
        "LCD @ bus {}, address 0x{:02x}, busy flag polling {}",
        bus_no, address, poll_busy_flag
    );

    if simulate {
        let mut bus = SimulatedDisplay::new(address);
        debug!("{:?} initialized.", bus);
        run(&mut Pcf8574HD44780Driver::new(&mut bus, address, poll_busy_flag))?;

        for row in 0..Pcf8574HD44780Driver::<SimulatedDisplay>::ROWS {
            info!("Row {}: {:?}", row, bus.row(row));
        }
        info!("Backlight {}", if bus.is_backlight_on() { "on" } else { "off" });
    } else {
        let mut bus = LinuxI2cBus::new(bus_no, address)?;
        debug!("{:?} initialized.", bus);
        run(&mut Pcf8574HD44780Driver::new(&mut bus, address, poll_busy_flag))?;
    }

    info!("Done.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_decimal_and_hex_addresses() {
        assert_eq!(parse_address("39").unwrap(), 0x27);
        assert_eq!(parse_address("0x3f").unwrap(), 0x3f);
        assert_eq!(parse_address(" 0X27 ").unwrap(), 0x27);
        assert!(parse_address("0x80").is_err());
        assert!(parse_address("lcd").is_err());
    }

    #[test]
    fn parses_flags() {
        assert!(parse_flag("true").unwrap());
        assert!(parse_flag("1").unwrap());
        assert!(!parse_flag("False").unwrap());
        assert!(parse_flag("maybe").is_err());
    }

    #[test]
    fn demo_runs_against_the_simulator() {
        let mut bus = SimulatedDisplay::new(0x27);
        let result = run(&mut Pcf8574HD44780Driver::new(&mut bus, 0x27, false));

        // Local offset lookup can fail in multithreaded test processes
        if let Err(error) = result {
            assert!(error.downcast_ref::<time::error::IndeterminateOffset>().is_some());
        }
        assert!(bus.row(1).starts_with("    Hi World!\0"));
        // The clock, when shown, covers all but the tail of the greeting
        assert_eq!(&bus.row(0)[8..10], "ag");
        assert_eq!(bus.glyph(0), SMILEY);
        assert!(bus.is_backlight_on());
        assert!(!bus.is_cursor_visible());
    }
}
