use rand::Rng;

const FIREFOX_VERSIONS: [&str; 12] = [
    "133.0", "132.0", "131.0", "130.0", "129.0", "128.0", "127.0", "126.0", "125.0", "124.0",
    "123.0", "115.0",
];

const CHROME_VERSIONS: [&str; 16] = [
    "133.0.6943.60", "133.0.6943.88", "132.0.6834.83", "132.0.6834.110", "131.0.6778.85",
    "131.0.6778.108", "130.0.6723.92", "130.0.6723.117", "129.0.6668.70", "129.0.6668.89",
    "128.0.6613.120", "128.0.6613.138", "127.0.6533.88", "127.0.6533.119", "126.0.6478.126",
    "125.0.6422.141",
];

const EDGE_VERSIONS: [&str; 8] = [
    "133.0.3048.56", "133.0.3048.46", "132.0.2957.55", "132.0.2957.63", "131.0.2903.86",
    "131.0.2903.112", "130.0.2849.68", "129.0.2792.52",
];

const SAFARI_VERSIONS: [&str; 6] = ["18.2", "18.1", "18.0", "17.6", "17.5", "17.4"];

const DESKTOP_OS: [&str; 12] = [
    "Windows NT 10.0; Win64; x64",
    "Windows NT 10.0; WOW64",
    "Windows NT 11.0; Win64; x64",
    "Macintosh; Intel Mac OS X 10_15_7",
    "Macintosh; Intel Mac OS X 14_7_2",
    "Macintosh; Intel Mac OS X 15_2",
    "X11; Linux x86_64",
    "X11; Ubuntu; Linux x86_64",
    "X11; Fedora; Linux x86_64",
    "X11; Debian; Linux x86_64",
    "X11; Linux Mint; Linux x86_64",
    "X11; CrOS x86_64 15917.22.0",
];

const MOBILE_OS: [&str; 8] = [
    "iPhone; CPU iPhone OS 18_2 like Mac OS X",
    "iPhone; CPU iPhone OS 17_7 like Mac OS X",
    "iPad; CPU OS 18_1 like Mac OS X",
    "Linux; Android 15; Pixel 9 Pro",
    "Linux; Android 14; Pixel 8",
    "Linux; Android 14; SM-S921B",
    "Linux; Android 13; SM-S918B",
    "Linux; Android 14; OnePlus 12",
];

/// Accept-Language values rotated alongside the user agent.
const ACCEPT_LANGUAGES: [&str; 6] = [
    "en-US,en;q=0.9",
    "en-GB,en;q=0.9",
    "en-IN,en;q=0.9,hi;q=0.8",
    "en-US,en;q=0.8,de;q=0.6",
    "en,zh-TW;q=0.8,zh;q=0.6",
    "en-US,en;q=0.7,ko;q=0.5",
];

fn pick<'a>(items: &[&'a str]) -> &'a str {
    items[rand::rng().random_range(0..items.len())]
}

fn gen_firefox_ua() -> String {
    let version = pick(&FIREFOX_VERSIONS);
    let os = pick(&DESKTOP_OS);
    format!(
        "Mozilla/5.0 ({}; rv:{}) Gecko/20100101 Firefox/{}",
        os, version, version
    )
}

fn gen_chrome_ua() -> String {
    let version = pick(&CHROME_VERSIONS);
    let os = pick(&DESKTOP_OS);
    format!(
        "Mozilla/5.0 ({}) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{} Safari/537.36",
        os, version
    )
}

fn gen_chrome_mobile_ua() -> String {
    let version = pick(&CHROME_VERSIONS);
    let os = pick(&MOBILE_OS);

    if os.starts_with("iPhone") || os.starts_with("iPad") {
        format!(
            "Mozilla/5.0 ({}) AppleWebKit/537.36 (KHTML, like Gecko) CriOS/{} Mobile/15E148 Safari/604.1",
            os,
            version.split('.').next().unwrap_or("133")
        )
    } else {
        format!(
            "Mozilla/5.0 ({}) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{} Mobile Safari/537.36",
            os, version
        )
    }
}

fn gen_edge_ua() -> String {
    let edge = pick(&EDGE_VERSIONS);
    let chrome = pick(&CHROME_VERSIONS);
    let os = pick(&DESKTOP_OS[..3]);
    format!(
        "Mozilla/5.0 ({}) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{} Safari/537.36 Edg/{}",
        os, chrome, edge
    )
}

fn gen_safari_desktop_ua() -> String {
    let version = pick(&SAFARI_VERSIONS);
    let os = pick(&DESKTOP_OS[3..6]);
    format!(
        "Mozilla/5.0 ({}) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/{} Safari/605.1.15",
        os, version
    )
}

/// Builds a plausible browser user agent, weighted roughly by market share.
pub fn gen_random_ua() -> String {
    match rand::rng().random_range(0..20) {
        0..=8 => gen_chrome_ua(),
        9..=11 => gen_firefox_ua(),
        12..=13 => gen_edge_ua(),
        14..=15 => gen_safari_desktop_ua(),
        _ => gen_chrome_mobile_ua(),
    }
}

pub fn gen_accept_language() -> &'static str {
    pick(&ACCEPT_LANGUAGES)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gen_random_ua_variety() {
        for _ in 0..50 {
            let ua = gen_random_ua();
            assert!(ua.starts_with("Mozilla/5.0 ("), "{}", ua);
            assert!(!ua.contains("()"), "{}", ua);
        }
    }

    #[test]
    fn test_ua_formats() {
        assert!(gen_chrome_ua().contains("Chrome/"));
        assert!(gen_firefox_ua().contains("Firefox/"));
        assert!(gen_edge_ua().contains("Edg/"));
        assert!(gen_safari_desktop_ua().contains("Macintosh"));
        let mobile = gen_chrome_mobile_ua();
        assert!(mobile.contains("CriOS/") || mobile.contains("Mobile Safari"));
    }

    #[test]
    fn test_gen_accept_language() {
        assert!(ACCEPT_LANGUAGES.contains(&gen_accept_language()));
    }
}
