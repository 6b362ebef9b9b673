//! Main Leptos application component and routing.
//!
//! Every protected page renders through [`RouteGate`], which shows its
//! content only for an authorized application user. The status is computed
//! server-side per request; a failure to compute it keeps the gate in its
//! loading state instead of guessing.

use collectdesk_access::{ApplicationUser, BlockReason, InvitePresentation, PermissionCheck};
use collectdesk_gate::{AccessStatus, DenialReason, GateState, LoadingStage};
use leptos::form::ActionForm;
use leptos::prelude::*;
use leptos_meta::{Title, provide_meta_context};
use leptos_router::{
    components::{Redirect, Route, Router, Routes},
    hooks::{use_params, use_query_map},
    params::Params,
    path,
};

/// Server function returning the access status of the current request.
#[server]
pub async fn get_access_status() -> Result<AccessStatus, ServerFnError> {
    use crate::auth::{AppState, load_session, routes::access_status};
    use axum::Extension;
    use axum_extra::extract::CookieJar;
    use std::sync::Arc;

    let jar: CookieJar = leptos_axum::extract().await?;
    let Extension(state): Extension<Arc<AppState>> = leptos_axum::extract().await?;

    match load_session(&state, &jar).await {
        Ok(session) => Ok(access_status(&state, session.as_ref()).await),
        Err(rejection) => {
            tracing::warn!(?rejection, "session lookup failed");
            Ok(AccessStatus::Undetermined)
        }
    }
}

/// Server function returning the WhatsApp contact link, if configured.
#[server]
pub async fn get_contact_link() -> Result<Option<String>, ServerFnError> {
    use crate::auth::AppState;
    use axum::Extension;
    use std::sync::Arc;

    let Extension(state): Extension<Arc<AppState>> = leptos_axum::extract().await?;
    Ok(state.contact.whatsapp_url())
}

/// What the invite page shows for a token.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum InviteLookup {
    Open {
        invite: InvitePresentation,
        signed_in: bool,
    },
    NotFound,
    Expired,
    AlreadyUsed,
}

/// Server function to look up an invite by token.
#[server]
pub async fn get_invite(token: String) -> Result<InviteLookup, ServerFnError> {
    use crate::auth::{AppState, load_session};
    use crate::error::ApiError;
    use axum::Extension;
    use axum_extra::extract::CookieJar;
    use collectdesk_access::InviteError;
    use std::sync::Arc;

    let jar: CookieJar = leptos_axum::extract().await?;
    let Extension(state): Extension<Arc<AppState>> = leptos_axum::extract().await?;

    let signed_in = matches!(load_session(&state, &jar).await, Ok(Some(_)));

    match state.access.present_invite(&token, chrono::Utc::now()).await {
        Ok(invite) => Ok(InviteLookup::Open { invite, signed_in }),
        Err(InviteError::NotFound) => Ok(InviteLookup::NotFound),
        Err(InviteError::Expired) => Ok(InviteLookup::Expired),
        Err(InviteError::AlreadyUsed) => Ok(InviteLookup::AlreadyUsed),
        Err(e) => Err(ApiError::from(e).into_server_error()),
    }
}

/// Server function to accept an invite with the current session.
#[server]
pub async fn accept_invitation(
    token: String,
    corporate_email: Option<String>,
) -> Result<(), ServerFnError> {
    use crate::auth::{AppState, load_session};
    use crate::error::ApiError;
    use axum::Extension;
    use axum_extra::extract::CookieJar;
    use std::sync::Arc;

    let jar: CookieJar = leptos_axum::extract().await?;
    let Extension(state): Extension<Arc<AppState>> = leptos_axum::extract().await?;

    let session = load_session(&state, &jar)
        .await
        .map_err(|rejection| ApiError::from(rejection).into_server_error())?
        .ok_or_else(|| ApiError::NotAuthenticated.into_server_error())?;

    let corporate_email = corporate_email
        .as_deref()
        .map(str::trim)
        .filter(|email| !email.is_empty());

    let user = state
        .access
        .accept_invite(&token, session.identity(), corporate_email, chrono::Utc::now())
        .await
        .map_err(|e| ApiError::from(e).into_server_error())?;

    tracing::info!(user_id = %user.id, "invite accepted");
    leptos_axum::redirect("/");
    Ok(())
}

/// The main application component.
#[component]
pub fn App() -> impl IntoView {
    provide_meta_context();

    view! {
        <Title text="CollectDesk"/>
        <Router>
            <main class="container">
                <Routes fallback=|| "Página não encontrada.".into_view()>
                    <Route path=path!("/") view=HomePage/>
                    <Route path=path!("/login") view=LoginPage/>
                    <Route path=path!("/convite/:token") view=InvitePage/>
                </Routes>
            </main>
        </Router>
    }
}

/// Renders `render` only for an authorized application user.
///
/// No session redirects to the login page. A denial renders the terminal
/// "Acesso Negado" view. An undetermined status stays in the loading view
/// with a retry.
#[component]
pub fn RouteGate(render: fn(ApplicationUser) -> AnyView) -> impl IntoView {
    let status = Resource::new(|| (), |_| get_access_status());

    view! {
        <Suspense fallback=move || view! { <GateLoading stage=LoadingStage::Session/> }>
            {move || {
                status.get().map(|result| {
                    match GateState::from_status(result) {
                        GateState::Content(user) => render(user),
                        GateState::RedirectToLogin => view! { <Redirect path="/login"/> }.into_any(),
                        GateState::Denied(reason) => view! { <AccessDenied reason=reason/> }.into_any(),
                        GateState::Loading(LoadingStage::Unreachable) => view! {
                            <div class="gate-loading">
                                <p>"Não foi possível verificar seu acesso."</p>
                                <button class="retry-button" on:click=move |_| status.refetch()>
                                    "Tentar novamente"
                                </button>
                            </div>
                        }.into_any(),
                        GateState::Loading(stage) => view! { <GateLoading stage=stage/> }.into_any(),
                    }
                })
            }}
        </Suspense>
    }
}

#[component]
fn GateLoading(stage: LoadingStage) -> impl IntoView {
    let label = match stage {
        LoadingStage::Session => "Verificando sessão...",
        LoadingStage::Authorization => "Verificando permissões...",
        LoadingStage::Unreachable => "Reconectando...",
    };

    view! {
        <div class="gate-loading">
            <span class="spinner"></span>
            <p>{label}</p>
        </div>
    }
}

fn denial_message(reason: DenialReason) -> &'static str {
    match reason {
        DenialReason::NotRegistered => {
            "Sua conta não está cadastrada nesta operação. Solicite um convite ao administrador."
        }
        DenialReason::Blocked(BlockReason::Inactive) => "Sua conta foi desativada.",
        DenialReason::Blocked(BlockReason::PendingActivation) => {
            "Sua conta ainda não foi ativada."
        }
        DenialReason::Blocked(BlockReason::UnverifiedEmail) => {
            "Seu provedor de login não confirmou o seu e-mail."
        }
        DenialReason::Blocked(BlockReason::SubjectMismatch) => {
            "Este e-mail está vinculado a outra conta de login."
        }
        DenialReason::Blocked(BlockReason::RoleMissing) => {
            "Sua conta não possui um cargo válido."
        }
        DenialReason::Unspecified => "Você não tem acesso a este painel.",
    }
}

/// Terminal view for an authenticated identity without access.
#[component]
pub fn AccessDenied(reason: DenialReason) -> impl IntoView {
    let contact = Resource::new(|| (), |_| get_contact_link());

    view! {
        <div class="access-denied">
            <h1>"Acesso Negado"</h1>
            <p>{denial_message(reason)}</p>
            <Suspense fallback=|| ()>
                {move || {
                    contact.get().map(|result| match result {
                        Ok(Some(url)) => view! {
                            <a href=url class="whatsapp-button" target="_blank" rel="noopener noreferrer">
                                "Falar com o suporte pelo WhatsApp"
                            </a>
                        }.into_any(),
                        _ => view! {
                            <p class="contact-fallback">"Procure o administrador da sua operação."</p>
                        }.into_any(),
                    })
                }}
            </Suspense>
            <a href="/auth/logout" rel="external" class="link-button">"Sair e entrar com outra conta"</a>
        </div>
    }
}

/// Home page.
#[component]
fn HomePage() -> impl IntoView {
    view! { <RouteGate render=dashboard/> }
}

const SECTIONS: &[(&str, &str, &str)] = &[
    ("cases.view", "Casos", "Carteira de casos e linha do tempo"),
    ("journeys.view", "Jornadas", "Cadências de contato"),
    ("analytics.view", "Análises", "Indicadores de recuperação"),
    ("consent.view", "Consentimento", "Histórico LGPD"),
    ("knowledge.view", "Base de Conhecimento", "Documentos de apoio"),
    ("users.view", "Equipe", "Usuários, cargos e convites"),
    ("settings.manage", "Configurações", "Parâmetros da operação"),
];

fn dashboard(user: ApplicationUser) -> AnyView {
    let sections: Vec<_> = SECTIONS
        .iter()
        .filter(|(code, _, _)| user.has_permission(code))
        .map(|(_, title, description)| {
            view! {
                <li class="section-card">
                    <h3>{*title}</h3>
                    <p>{*description}</p>
                </li>
            }
        })
        .collect_view();
    let role_style = format!("background-color: {}", user.role_color);

    view! {
        <div class="dashboard">
            <header class="header">
                <span class="user-name">{user.name.clone()}</span>
                <span class="role-badge" style=role_style>{user.role_name.clone()}</span>
                <a href="/auth/logout" rel="external" class="logout-link">"Sair"</a>
            </header>
            <ul class="sections">{sections}</ul>
        </div>
    }
    .into_any()
}

fn login_error_message(code: &str) -> &'static str {
    match code {
        "cancelado" => "O login foi cancelado.",
        "sessao" => "Sua tentativa de login expirou. Tente novamente.",
        _ => "Não foi possível validar o login. Tente novamente.",
    }
}

/// Login page - redirects to the identity provider.
#[component]
fn LoginPage() -> impl IntoView {
    let query = use_query_map();
    let error = move || query.read().get("erro").map(|code| login_error_message(&code));

    view! {
        <div class="login-page">
            <div class="login-box">
                <h1>"Entrar no CollectDesk"</h1>
                {move || error().map(|msg| view! { <p class="login-error">{msg}</p> })}
                <a href="/auth/login" rel="external" class="login-button">"Entrar com Google"</a>
            </div>
        </div>
    }
}

#[derive(Params, PartialEq, Clone, Debug)]
struct InviteParams {
    token: Option<String>,
}

/// Invite landing page.
#[component]
fn InvitePage() -> impl IntoView {
    let params = use_params::<InviteParams>();
    let token = Signal::derive(move || params.get().ok().and_then(|p| p.token));

    let lookup = Resource::new(
        move || token.get(),
        |token| async move {
            match token {
                Some(token) => get_invite(token).await,
                None => Ok(InviteLookup::NotFound),
            }
        },
    );

    view! {
        <div class="invite-page">
            <Suspense fallback=move || view! { <p>"Carregando convite..."</p> }>
                {move || {
                    lookup.get().map(|result| match result {
                        Ok(InviteLookup::Open { invite, signed_in }) => view! {
                            <InviteDetails
                                token=token.get().unwrap_or_default()
                                invite=invite
                                signed_in=signed_in
                            />
                        }.into_any(),
                        Ok(InviteLookup::NotFound) => view! {
                            <p class="invite-error">"Convite não encontrado."</p>
                        }.into_any(),
                        Ok(InviteLookup::Expired) => view! {
                            <p class="invite-error">"Este convite expirou. Peça um novo ao administrador."</p>
                        }.into_any(),
                        Ok(InviteLookup::AlreadyUsed) => view! {
                            <p class="invite-error">"Este convite já foi utilizado."</p>
                        }.into_any(),
                        Err(e) => view! {
                            <p class="invite-error">{e.to_string()}</p>
                        }.into_any(),
                    })
                }}
            </Suspense>
        </div>
    }
}

#[component]
fn InviteDetails(token: String, invite: InvitePresentation, signed_in: bool) -> impl IntoView {
    let accept = ServerAction::<AcceptInvitation>::new();
    let invited_by = invite
        .invited_by_name
        .clone()
        .map(|name| format!("Convidado por {name}"));
    let expires = invite.expires_at.format("%d/%m/%Y %H:%M").to_string();
    let role_style = format!("background-color: {}", invite.role_color);

    let action_view = if signed_in {
        let hint = invite.corporate_email_hint.clone();
        let email_field = invite.requires_corporate_validation.then(|| {
            view! {
                <div class="form-row">
                    <label for="corporate_email">"E-mail corporativo"</label>
                    <input type="email" id="corporate_email" name="corporate_email" required placeholder=hint/>
                </div>
            }
        });
        view! {
            <ActionForm action=accept>
                <input type="hidden" name="token" value=token.clone()/>
                {email_field}
                <button type="submit" class="accept-button">"Aceitar convite"</button>
            </ActionForm>
            {move || {
                accept.value().get().and_then(|result| result.err()).map(|e| {
                    view! { <p class="invite-error">{e.to_string()}</p> }
                })
            }}
        }
        .into_any()
    } else {
        let login_href = format!("/auth/login?invite={token}");
        view! {
            <a href=login_href rel="external" class="login-button">"Entrar para aceitar"</a>
        }
        .into_any()
    };

    view! {
        <div class="invite-card">
            <h1>{format!("Olá, {}", invite.name)}</h1>
            <p>
                "Você foi convidado para o cargo "
                <span class="role-badge" style=role_style>{invite.role_name.clone()}</span>
            </p>
            {invited_by.map(|text| view! { <p class="invited-by">{text}</p> })}
            <p class="invite-expiry">{format!("Válido até {expires}")}</p>
            {action_view}
        </div>
    }
}
