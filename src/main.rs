use std::process::exit;

fn main() {
    if let Err(e) = mcalr::get_args().and_then(mcalr::run) {
        // 使い方を先に出してからエラー内容を出す
        println!("{}", mcalr::usage());
        println!("{}", e);
        exit(mcalr::exit_code(&e));
    }
}
