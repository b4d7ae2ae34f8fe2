//! Amazon のページ要素
//!
//! サイト側のレイアウト変更で壊れうる。代替セレクタは持たない。

use crate::traits::Locator;

/// トップページの「Hello, sign in」（ボットチェック後に現れる）
pub const SIGN_IN_ENTRY: Locator<'static> = Locator::Text {
    tag: "span",
    text: "Hello, sign in",
};

pub const EMAIL_FIELD: Locator<'static> = Locator::Css("input#ap_email, input[name='email']");
pub const CONTINUE_BUTTON: Locator<'static> = Locator::Css("input#continue");
pub const PASSWORD_FIELD: Locator<'static> =
    Locator::Css("input#ap_password, input[name='password']");
/// 未チェックの場合のみ一致（クリックはトグルなので）
pub const KEEP_SIGNED_IN: Locator<'static> =
    Locator::Css("input[name='rememberMe']:not(:checked)");
pub const SIGN_IN_BUTTON: Locator<'static> = Locator::Css("input#signInSubmit");

/// 2段階認証・本人確認ページ
pub const VERIFICATION_PROMPTS: &[Locator<'static>] = &[
    Locator::Css("#auth-mfa-otpcode"),
    Locator::Css("input[name='otpCode']"),
    Locator::Css("#cvf-page-content"),
];

pub const ORDERS_ENTRY: Locator<'static> = Locator::Text {
    tag: "a",
    text: "Returns & Orders",
};

pub const YEAR_OPTIONS: Locator<'static> = Locator::Css("select#time-filter option");
pub const YEAR_FILTER: Locator<'static> =
    Locator::Css("form[action=\"/your-orders/orders\"] select#time-filter");

pub const ORDER_CARD: Locator<'static> = Locator::Css(".order.js-order-card");

pub const NEXT_PAGE: Locator<'static> = Locator::Text {
    tag: "a",
    text: "Next →",
};

/// 注文カード内の請求書リンクのテキスト
pub const INVOICE_LINK_TEXT: &str = "View invoice";

/// 年フィルターの option value
pub fn year_filter_value(year: i32) -> String {
    format!("year-{}", year)
}
