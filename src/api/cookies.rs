/// JWT cookie transport
///
/// Tokens ride in httponly cookies and/or the JSON body; cookie names
/// and attributes come from configuration, and the refresh cookie is
/// scoped to a restricted path.
use crate::config::CookieConfig;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

fn samesite(config: &CookieConfig) -> SameSite {
    match config.samesite.as_str() {
        "strict" => SameSite::Strict,
        "none" => SameSite::None,
        _ => SameSite::Lax,
    }
}

fn build_cookie(
    name: &str,
    value: &str,
    path: &str,
    config: &CookieConfig,
) -> Cookie<'static> {
    Cookie::build((name.to_string(), value.to_string()))
        .path(path.to_string())
        .secure(config.secure)
        .http_only(config.httponly)
        .same_site(samesite(config))
        .build()
}

/// Attach the access cookie
pub fn set_access_cookie(jar: CookieJar, config: &CookieConfig, access_token: &str) -> CookieJar {
    jar.add(build_cookie(&config.access_name, access_token, "/", config))
}

/// Attach the refresh cookie on its restricted path
pub fn set_refresh_cookie(jar: CookieJar, config: &CookieConfig, refresh_token: &str) -> CookieJar {
    jar.add(build_cookie(
        &config.refresh_name,
        refresh_token,
        &config.refresh_path,
        config,
    ))
}

/// Attach both token cookies
pub fn set_jwt_cookies(
    jar: CookieJar,
    config: &CookieConfig,
    access_token: &str,
    refresh_token: &str,
) -> CookieJar {
    let jar = set_access_cookie(jar, config, access_token);
    set_refresh_cookie(jar, config, refresh_token)
}

/// Clear both token cookies (logout, forced re-login)
pub fn unset_jwt_cookies(jar: CookieJar, config: &CookieConfig) -> CookieJar {
    let access = Cookie::build((config.access_name.clone(), ""))
        .path("/")
        .build();
    let refresh = Cookie::build((config.refresh_name.clone(), ""))
        .path(config.refresh_path.clone())
        .build();
    jar.remove(access).remove(refresh)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CookieConfig {
        CookieConfig {
            access_name: "access".into(),
            refresh_name: "refresh".into(),
            secure: true,
            httponly: true,
            samesite: "lax".into(),
            refresh_path: "/auth/token".into(),
        }
    }

    #[test]
    fn sets_both_cookies_with_attributes() {
        let jar = set_jwt_cookies(CookieJar::new(), &config(), "acc-token", "ref-token");

        let access = jar.get("access").unwrap();
        assert_eq!(access.value(), "acc-token");
        assert_eq!(access.path(), Some("/"));
        assert_eq!(access.http_only(), Some(true));
        assert_eq!(access.secure(), Some(true));

        let refresh = jar.get("refresh").unwrap();
        assert_eq!(refresh.value(), "ref-token");
        assert_eq!(refresh.path(), Some("/auth/token"));
    }

    #[test]
    fn samesite_parsing_defaults_to_lax() {
        let mut cfg = config();
        cfg.samesite = "bogus".into();
        assert_eq!(samesite(&cfg), SameSite::Lax);
        cfg.samesite = "strict".into();
        assert_eq!(samesite(&cfg), SameSite::Strict);
        cfg.samesite = "none".into();
        assert_eq!(samesite(&cfg), SameSite::None);
    }
}
