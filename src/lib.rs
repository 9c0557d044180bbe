use std::{error::Error, fmt, str::FromStr};

use chrono::{Datelike, Local, NaiveDate};
use clap::{App, Arg, ErrorKind};
use itertools::iterate;

type MyResult<T> = Result<T, Box<dyn Error>>;

const CELL_WIDTH: usize = 20;

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

// 週の先頭既定値に合わせた月曜始まりの並び
const DAY_NAMES: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

const DATE_HELP: &str = "\
DATE arguments are formatted as:
  <n>                 : month <n> if 1 <= n <= 12, else year <n>
  <m>/<y>             : month <m> in year <y>
  <m1>-<m2>           : months from <m1> to <m2>, inclusive
  <y1>-<y2>           : years from <y1> to <y2>, inclusive
  <m1>-<m2>/<y>       : months from <m1> to <m2> in year <y>, inclusive
  <m1>/<y1>-<m2>/<y2> : months from <m1> in year <y1> to <m2> in <y2>
A month is 1-12, a name January-December, or any abbreviation of one.
A year is fully qualified, ie. 10 is year 10, not 2010.";

#[derive(Debug)]
pub struct Config {
    columns: usize,
    separator: String,
    firstday: u32, // 0 = 月曜
    fullyear: bool,
    dates: Vec<String>,
    today: NaiveDate,
}

// 使い方の誤りを終了コード付きで表すエラー
#[derive(Debug)]
struct UsageError {
    code: i32,
    message: String,
}

impl UsageError {
    fn boxed(code: i32, message: String) -> Box<dyn Error> {
        Box::new(UsageError { code, message })
    }
}

impl fmt::Display for UsageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for UsageError {}

pub fn exit_code(err: &Box<dyn Error>) -> i32 {
    err.downcast_ref::<UsageError>().map_or(1, |e| e.code)
}

// 解決済みのトークン: 月の範囲か年の範囲かで分ける
#[derive(Debug, PartialEq)]
enum DateRange {
    Months { start: (i32, u32), end: (i32, u32) },
    Years { start: i32, end: i32 },
}

impl DateRange {
    // (開始年, 開始月, 終了年, 終了月)に展開する: 年の範囲は1月から12月
    fn bounds(&self) -> (i32, u32, i32, u32) {
        match *self {
            DateRange::Months { start, end } => (start.0, start.1, end.0, end.1),
            DateRange::Years { start, end } => (start, 1, end, 12),
        }
    }
}

fn build_app() -> App<'static, 'static> {
    App::new("mcalr")
        .version("0.1.0")
        .author("kazuki.ogiwara")
        .about("Rust cal with date ranges")
        .after_help(DATE_HELP)
        .arg(
            Arg::with_name("year")
                .short("y")
                .long("year")
                .help("Interpret DATE arguments as whole years")
                .takes_value(false),
        )
        .arg(
            Arg::with_name("columns")
                .value_name("COLUMNS")
                .short("c")
                .long("columns")
                .help("Number of months per row")
                .default_value("3"),
        )
        .arg(
            Arg::with_name("separator")
                .value_name("SEPARATOR")
                .short("s")
                .long("separator")
                .help("Text between months in a row")
                .default_value("    "),
        )
        .arg(
            Arg::with_name("firstday")
                .value_name("FIRSTDAY")
                .short("f")
                .long("firstday")
                .help("Weekday name or number (0-6) starting each week")
                .default_value("monday"),
        )
        .arg(
            Arg::with_name("dates")
                .value_name("DATE")
                .help("Months, years or ranges to show")
                .multiple(true),
        )
}

pub fn get_args() -> MyResult<Config> {
    let matches = match build_app().get_matches_safe() {
        Ok(matches) => matches,
        Err(err) => {
            // ヘルプとバージョンはclapの出力のまま正常終了させる
            if err.kind == ErrorKind::HelpDisplayed || err.kind == ErrorKind::VersionDisplayed {
                err.exit();
            }
            let message = err.message.lines().next().unwrap_or_default().to_string();
            return Err(UsageError::boxed(2, message));
        }
    };

    let columns = parse_columns(matches.value_of("columns").unwrap())
        .map_err(|err| UsageError::boxed(3, err.to_string()))?;
    let firstday = parse_firstday(matches.value_of("firstday").unwrap())
        .map_err(|err| UsageError::boxed(3, err.to_string()))?;

    Ok(Config {
        columns,
        separator: matches.value_of("separator").unwrap().to_string(),
        firstday,
        fullyear: matches.is_present("year"),
        dates: matches.values_of_lossy("dates").unwrap_or_default(),
        today: Local::today().naive_local(),
    })
}

// クレート外へのヘルプ出力: エラー時に使い方を先に出すため
pub fn usage() -> String {
    let mut buf = Vec::new();
    match build_app().write_help(&mut buf) {
        Ok(_) => String::from_utf8_lossy(&buf).into_owned(),
        Err(_) => String::new(),
    }
}

pub fn run(config: Config) -> MyResult<()> {
    let tokens = if config.dates.is_empty() {
        vec![config.today.month().to_string()] // 引数なしは今月のみ
    } else {
        config.dates.clone()
    };

    // 出力前に全トークンを解決する: エラー時は何も出力しない
    let mut months = vec![];
    for token in &tokens {
        let (sy, sm, ey, em) = resolve_token(token, config.today.year(), config.fullyear)?.bounds();
        months.extend(range_months(sy, sm, ey, em).map(|(y, m)| format_month(y, m, config.firstday)));
    }

    for line in format_months(months, config.columns, &config.separator) {
        print!("{}", line);
    }
    Ok(())
}

fn parse_int<T: FromStr>(val: &str) -> MyResult<T> {
    val.parse()
        .map_err(|_| format!("Invalid integer \"{}\"", val).into())
}

fn parse_columns(val: &str) -> MyResult<usize> {
    parse_int(val).and_then(|num: usize| {
        if num > 0 {
            Ok(num)
        } else {
            Err(format!("columns \"{}\" must be greater than 0", val).into())
        }
    })
}

fn is_digits(val: &str) -> bool {
    !val.is_empty() && val.chars().all(|c| c.is_ascii_digit())
}

// 名前テーブルを前方一致で探す: 長い前置から試し、表の並び順で先勝ちさせる
fn prefix_position(table: &[&str], token: &str) -> Option<usize> {
    let lower = token.to_lowercase();
    let longest = table.iter().map(|name| name.len()).max().unwrap_or(0);
    (1..=longest).rev().find_map(|len| {
        table.iter().position(|name| {
            let name = name.to_lowercase();
            lower == name[..name.len().min(len)]
        })
    })
}

// 月の指定を解決する: 数字はそのまま、名前は前方一致で1始まりの位置
fn parse_month(month: &str) -> MyResult<u32> {
    if is_digits(month) {
        parse_int(month)
    } else {
        prefix_position(&MONTH_NAMES, month)
            .map(|pos| pos as u32 + 1)
            .ok_or_else(|| format!("Invalid month \"{}\"", month).into())
    }
}

// 週の先頭の曜日を解決する: 月曜始まりの0始まり位置
fn parse_firstday(day: &str) -> MyResult<u32> {
    let num = if is_digits(day) {
        parse_int(day)?
    } else {
        prefix_position(&DAY_NAMES, day)
            .map(|pos| pos as u32)
            .ok_or_else(|| format!("Invalid weekday \"{}\"", day))?
    };
    if num < 7 {
        Ok(num)
    } else {
        Err(format!("weekday \"{}\" not in the range 0 through 6", day).into())
    }
}

// "月" または "月/年" を(月, 年)に解決する
fn resolve_part(part: &str, default_year: i32) -> MyResult<(u32, i32)> {
    match part.split_once('/') {
        Some((month, year)) => Ok((parse_month(month)?, parse_int(year)?)),
        None => Ok((parse_month(part)?, default_year)),
    }
}

fn resolve_token(token: &str, this_year: i32, fullyear: bool) -> MyResult<DateRange> {
    if fullyear {
        let year = parse_int(token).map_err(|err| UsageError::boxed(4, err.to_string()))?;
        return Ok(DateRange::Years { start: year, end: year });
    }

    let (s, e) = match token.split_once('-') {
        Some((s, e)) => (s, e),
        None => (token, token),
    };

    // 終端側を先に解決する: 開始側の年の既定値になるため
    let (em, ey) = resolve_part(e, this_year).map_err(|err| UsageError::boxed(4, err.to_string()))?;
    let (sm, sy) = resolve_part(s, ey).map_err(|err| UsageError::boxed(5, err.to_string()))?;

    // 月の位置に12を超える値がある場合: トークンは年または年範囲を表す
    if sm > 12 || em > 12 {
        Ok(DateRange::Years {
            start: sm as i32,
            end: em as i32,
        })
    } else {
        Ok(DateRange::Months {
            start: (sy, sm),
            end: (ey, em),
        })
    }
}

fn next_month(year: i32, month: u32) -> (i32, u32) {
    if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    }
}

// 開始月から終了月までを順に返す: 開始月は必ず1つは返す
fn range_months(sy: i32, sm: u32, ey: i32, em: u32) -> impl Iterator<Item = (i32, u32)> {
    let end = ey * 12 + em as i32;
    std::iter::once((sy, sm)).chain(
        iterate(next_month(sy, sm), |&(y, m)| next_month(y, m))
            .take_while(move |&(y, m)| y * 12 + m as i32 <= end),
    )
}

fn format_month(year: i32, month: u32, firstday: u32) -> Vec<String> {
    let first = NaiveDate::from_ymd(year, month, 1);
    let last = last_day_in_month(year, month);

    // 初日より前の曜日を空白2マスで埋める
    let offset = (first.weekday().num_days_from_monday() + 7 - firstday) % 7;
    let mut days: Vec<String> = (0..offset).map(|_| "  ".to_string()).collect();
    days.extend((first.day()..=last.day()).map(|num| format!("{:>2}", num)));

    let mut lines = Vec::with_capacity(8); // 年月1行, 曜日1行, 日付最大6行

    // 年月の行
    lines.push(format!(
        "{:^width$}",
        format!("{} {}", MONTH_NAMES[month as usize - 1], year),
        width = CELL_WIDTH
    ));

    // 曜日の行: 先頭の曜日から順に2文字で並べる
    let header = (0..7)
        .map(|i| &DAY_NAMES[((firstday + i) % 7) as usize][..2])
        .collect::<Vec<_>>()
        .join(" ");
    lines.push(header);

    // 各週の行
    for week in days.chunks(7) {
        lines.push(format!("{:<width$}", week.join(" "), width = CELL_WIDTH));
    }

    while lines.len() < 8 {
        lines.push(" ".repeat(CELL_WIDTH));
    }

    lines
}

// 月末の日付を返す: うるう年の対策
fn last_day_in_month(year: i32, month: u32) -> NaiveDate {
    let (y, m) = next_month(year, month);
    NaiveDate::from_ymd(y, m, 1).pred()
}

// 空のセル: 月の並びの端数を埋める
fn blank_cell() -> Vec<String> {
    vec![" ".repeat(CELL_WIDTH); 8]
}

// セルを幅20桁・8行単位に整える
fn normalize_cell(lines: Vec<String>) -> Vec<String> {
    let mut lines = lines;
    while lines.is_empty() || lines.len() % 8 != 0 {
        lines.push(String::new());
    }
    // 先頭行(年月)を中央揃えし直す
    let title = format!("{:^width$}", lines[0].trim(), width = CELL_WIDTH);
    lines[0] = title;
    for line in lines.iter_mut() {
        let padded = format!("{:<width$}", line, width = CELL_WIDTH);
        *line = padded;
    }
    lines
}

// 月のセル並びをncols列のページに組む
fn format_months<'a>(
    months: Vec<Vec<String>>,
    ncols: usize,
    sep: &'a str,
) -> impl Iterator<Item = String> + 'a {
    // 月が1つもなくても1行組は出す
    let rows = ((months.len() + ncols - 1) / ncols).max(1);

    let mut cells: Vec<Vec<String>> = months.into_iter().map(normalize_cell).collect();
    // 末尾の行組が埋まるまで空のセルを足す
    cells.resize_with(rows * ncols, blank_cell);

    (0..rows * 8).map(move |n| {
        let (row, i) = (n / 8, n % 8);
        let mut line = String::new();
        for cell in &cells[row * ncols..(row + 1) * ncols] {
            line.push_str(&cell[i]);
            line.push_str(sep);
        }
        line.push('\n');
        line
    })
}
