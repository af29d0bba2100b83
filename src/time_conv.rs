/// Parse an MS-DOS datetime value.
///
/// Note: the time value only has a precision of two seconds.
/// https://learn.microsoft.com/en-us/windows/win32/sysinfo/ms-dos-date-and-time
pub fn parse_dos_datetime(
    dos_time: u32,
) -> Result<time::PrimitiveDateTime, time::error::ComponentRange> {
    let second = ((dos_time & 0x1f) * 2) as u8;
    let minute = ((dos_time >> 5) & 0x3f) as u8;
    let hour = ((dos_time >> 11) & 0x1f) as u8;
    let time = time::Time::from_hms(hour, minute, second)?;

    let day = ((dos_time >> 16) & 0x1f) as u8;
    let month = ((dos_time >> 21) & 0x0f) as u8;
    let year = ((dos_time >> 25) + 1980) as i32;
    let date = time::Date::from_calendar_date(year, month.try_into()?, day)?;

    Ok(time::PrimitiveDateTime::new(date, time))
}

pub fn parse_unix_timestamp_sec(
    seconds: u32,
) -> Result<time::OffsetDateTime, time::error::ComponentRange> {
    time::OffsetDateTime::from_unix_timestamp(seconds.into())
}

#[test]
fn test_parse_dos_datetime() {
    // 2023-06-15 12:30:10, packed as yyyyyyym mmmddddd hhhhhmmm mmmsssss
    let packed = (43 << 25) | (6 << 21) | (15 << 16) | (12 << 11) | (30 << 5) | 5;
    assert_eq!(
        format!("{}", parse_dos_datetime(packed).unwrap()),
        "2023-06-15 12:30:10.0",
    );
}

#[test]
fn test_parse_dos_datetime_out_of_range() {
    // Month 15 does not exist.
    let packed = 15 << 21;
    assert!(parse_dos_datetime(packed).is_err());
}
