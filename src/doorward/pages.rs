//! Minimal server-rendered pages carrying the form contract plus an inline
//! proof-of-work solver, so a login works without any external assets.
//! Styling is left to whatever fronts the deployment.

fn layout(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head><meta charset=\"utf-8\">\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\
         <title>{title} - doorward</title></head>\n<body>{body}</body>\n</html>\n"
    )
}

// On submit: fetch a challenge, brute-force the nonces with SubtleCrypto,
// redeem them for a verification token, fill cap_token, then really submit.
const SOLVER: &str = r#"<script>
const form = document.querySelector('.login-form');
form.addEventListener('submit', async (event) => {
  if (form.cap_token.value) return;
  event.preventDefault();
  const enc = new TextEncoder();
  const hex = (buf) => [...new Uint8Array(buf)]
    .map((b) => b.toString(16).padStart(2, '0')).join('');
  const c = await (await fetch('/api/cap/challenge', { method: 'POST' })).json();
  const solutions = [];
  for (const [salt, target] of c.challenge) {
    for (let nonce = 0; ; nonce++) {
      const digest = hex(await crypto.subtle.digest('SHA-256', enc.encode(salt + nonce)));
      if (digest.startsWith(target)) { solutions.push(nonce); break; }
    }
  }
  const r = await (await fetch('/api/cap/redeem', {
    method: 'POST',
    headers: { 'content-type': 'application/json' },
    body: JSON.stringify({ token: c.token, solutions }),
  })).json();
  if (r.success) { form.cap_token.value = r.token; form.submit(); }
});
</script>"#;

pub fn login(error: bool, redirect: &str) -> String {
    let error_html = if error {
        "<p class=\"error\">Invalid username or password</p>"
    } else {
        ""
    };
    let redirect = html_escape(redirect);
    layout(
        "Sign in",
        &format!(
            "{error_html}\
             <form class=\"login-form\" method=\"post\" action=\"/\">\
             <input name=\"username\" autocomplete=\"username\" required>\
             <input name=\"password\" type=\"password\" autocomplete=\"current-password\" required>\
             <input type=\"hidden\" id=\"redirect\" name=\"redirect\" value=\"{redirect}\">\
             <input type=\"hidden\" name=\"cap_token\" value=\"\">\
             <label><input type=\"checkbox\" name=\"remember\" value=\"on\">Remember me</label>\
             <button type=\"submit\">Sign in</button>\
             </form>{SOLVER}"
        ),
    )
}

pub fn index(username: &str, expires_at: i64) -> String {
    let username = html_escape(username);
    layout(
        "Signed in",
        &format!(
            "<p>Signed in as <strong>{username}</strong></p>\
             <p>Session expires at <time data-epoch=\"{expires_at}\">{expires_at}</time></p>\
             <p><a href=\"/logout\">Sign out</a></p>"
        ),
    )
}

pub fn logout() -> String {
    layout(
        "Signed out",
        "<p>You have been signed out.</p><p><a href=\"/\">Sign in again</a></p>",
    )
}

fn html_escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
