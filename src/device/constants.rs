use uuid::Uuid;

/**
 * Name the peripheral advertises out of the box. Used when no address is configured.
 */
pub const DEFAULT_DEVICE_NAME: &str = "Nuimo";

/**
 * How long (milliseconds) to scan for advertisements before looking at the discovered peripherals.
 */
pub const SCAN_DURATION: u64 = 3000;

/**
 * How long (milliseconds) a write to a characteristic may take.
 */
pub const WRITE_DEADLINE: u64 = 2000;

pub const BATTERY_SERVICE: Uuid = Uuid::from_u128(0x0000180f_0000_1000_8000_00805f9b34fb);
pub const DEVICE_INFORMATION_SERVICE: Uuid = Uuid::from_u128(0x0000180a_0000_1000_8000_00805f9b34fb);
pub const SENSOR_SERVICE: Uuid = Uuid::from_u128(0xf29b1525_cb19_40f3_be5c_7241ecb82fd2);
pub const LED_MATRIX_SERVICE: Uuid = Uuid::from_u128(0xf29b1523_cb19_40f3_be5c_7241ecb82fd1);

pub const BATTERY_CHARACTERISTIC: Uuid = Uuid::from_u128(0x00002a19_0000_1000_8000_00805f9b34fb);
/**
 * Manufacturer name string, part of the device information service.
 */
pub const MANUFACTURER_NAME_CHARACTERISTIC: Uuid = Uuid::from_u128(0x00002a29_0000_1000_8000_00805f9b34fb);
pub const BUTTON_CHARACTERISTIC: Uuid = Uuid::from_u128(0xf29b1529_cb19_40f3_be5c_7241ecb82fd2);
pub const ROTATION_CHARACTERISTIC: Uuid = Uuid::from_u128(0xf29b1528_cb19_40f3_be5c_7241ecb82fd2);
pub const SWIPE_CHARACTERISTIC: Uuid = Uuid::from_u128(0xf29b1527_cb19_40f3_be5c_7241ecb82fd2);
pub const FLY_CHARACTERISTIC: Uuid = Uuid::from_u128(0xf29b1526_cb19_40f3_be5c_7241ecb82fd2);
pub const LED_MATRIX_CHARACTERISTIC: Uuid = Uuid::from_u128(0xf29b1524_cb19_40f3_be5c_7241ecb82fd1);

/**
 * Number of LEDs on the matrix (9x9). A display pattern must have exactly this many symbols.
 */
pub const LED_COUNT: usize = 81;

/**
 * Number of full row bytes in a display frame. The 81st LED lives in bit 0 of the byte after them.
 */
pub const ROW_BYTES: usize = 10;

/**
 * Size of a display frame: 10 row bytes, 1 byte for the last LED, brightness, timeout.
 */
pub const DISPLAY_FRAME_LEN: usize = 13;

pub const DEFAULT_BRIGHTNESS: u8 = 255;

/**
 * Tenths of a second, so 2.0s.
 */
pub const DEFAULT_TIMEOUT: u8 = 20;
